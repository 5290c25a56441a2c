use hotmod::config::{AppConfig, ReloadConfig};
use hotmod::{assemble, seed};
use serde_json::{json, Value};

// Boots the assembled app on an ephemeral port and exercises it over real
// HTTP, the way a developer's browser would.
#[tokio::test]
async fn test_server_serves_discovered_modules_over_http() {
    let dir = tempfile::tempdir().unwrap();
    seed::write_demo_module(dir.path()).unwrap();

    let config = AppConfig {
        reload: ReloadConfig {
            enabled: false,
            roots: vec![dir.path().to_string_lossy().into_owned()],
            debounce_ms: 50,
        },
        ..AppConfig::default()
    };
    let app = assemble(config).unwrap();
    seed::install_demo_beans(&app.context, &app.persistence);
    app.discovery.scan().unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let base = format!("http://{}", addr);
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], json!("healthy"));

    // The demo module's note routes were claimed by built-in discovery.
    let created = client
        .post(format!("{base}/notes"))
        .json(&json!({"text": "from http"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), reqwest::StatusCode::CREATED);
    let created: Value = created.json().await.unwrap();
    let id = created["id"].as_str().unwrap();

    let fetched: Value = client
        .get(format!("{base}/notes/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["text"], json!("from http"));

    let listed: Value = client
        .get(format!("{base}/notes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let missing = client
        .get(format!("{base}/nothing-here"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}
