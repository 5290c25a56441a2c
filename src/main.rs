use axum::serve;
use hotmod::config::AppConfig;
use hotmod::seed;
use std::path::Path;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress noisy watcher logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("notify", LevelFilter::Warn)
        .init();

    println!("hotmod: development-time hot-reload server");

    // Load configuration
    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{} reload={}",
        config.server.host, config.server.port, config.reload.enabled
    );

    let app = hotmod::assemble(config)?;

    // Register demo handler beans and drop a sample module into the first
    // watched root (optional)
    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        println!("Loading seed data...");
        seed::install_demo_beans(&app.context, &app.persistence);
        if let Some(root) = app.config.reload.roots.first() {
            let path = seed::write_demo_module(Path::new(root))?;
            println!("Sample module written to {}", path.display());
        }
    }

    println!("Scanning watched roots...");
    let report = app.discovery.scan()?;
    println!(
        "Discovery complete: {} modules, {} routes, {} entities",
        report.modules, report.routes, report.entities
    );

    let _reload = app.start_reload()?;

    let bind_address = app.config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("hotmod server running on http://{}", bind_address);

    serve(listener, app.router()).await?;

    Ok(())
}
