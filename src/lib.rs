pub mod api;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod model;
pub mod persist;
pub mod reload;
pub mod seed;

pub use config::AppConfig;
pub use context::AppContext;
pub use dispatch::{RequestHandler, RouteTable, SnapshotRouteTable};
pub use engine::{
    ArtifactWatcher, BuiltinDiscovery, LoaderBridge, ReloadEngine, RootRegistry, SwapRegistry,
    VersionSwapRegistry,
};
pub use persist::{InMemoryFactoryBuilder, PersistenceHandle, PersistenceUnit};
pub use reload::{PersistenceRefresher, ReloadBroker, ReloadListener, RouteRefresher};

use crate::api::handlers::ServeState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Everything the composition root wires together. One of these per
/// process; all the long-lived components hang off it by `Arc`, none of
/// them are statics.
pub struct App {
    pub config: AppConfig,
    pub context: Arc<AppContext>,
    pub builtin_routes: Arc<dyn RouteTable>,
    pub dynamic_routes: Arc<dyn RouteTable>,
    pub persistence: Arc<PersistenceHandle>,
    pub broker: Arc<ReloadBroker>,
    pub discovery: Arc<BuiltinDiscovery>,
    pub engine: Arc<ReloadEngine>,
}

/// Keeps the watcher and the reload thread alive; drop it to wind the
/// engine down (closing the event channel stops the thread).
pub struct ReloadTask {
    _watcher: ArtifactWatcher,
    pub thread: std::thread::JoinHandle<()>,
}

pub fn assemble(config: AppConfig) -> anyhow::Result<App> {
    let context = Arc::new(AppContext::new());
    let builtin_routes: Arc<dyn RouteTable> = Arc::new(SnapshotRouteTable::new());
    let dynamic_routes: Arc<dyn RouteTable> = Arc::new(SnapshotRouteTable::new());
    let persistence = Arc::new(PersistenceHandle::new(
        Box::new(InMemoryFactoryBuilder::new()),
        PersistenceUnit::new(config.persistence.properties.clone()),
    )?);

    let roots = Arc::new(RootRegistry::new(
        config.reload.roots.iter().map(PathBuf::from),
    ));
    let swap: Arc<dyn SwapRegistry> = Arc::new(VersionSwapRegistry::new());
    let bridge = Arc::new(LoaderBridge::new(swap));

    let mut broker = ReloadBroker::new();
    broker.add_listener(Arc::new(RouteRefresher::new(
        dynamic_routes.clone(),
        context.clone(),
    )));
    broker.add_listener(Arc::new(PersistenceRefresher::new(persistence.clone())));
    let broker = Arc::new(broker);
    broker.install(&context);

    let discovery = Arc::new(BuiltinDiscovery::new(
        roots.clone(),
        bridge.clone(),
        context.clone(),
        builtin_routes.clone(),
        persistence.clone(),
        broker.clone(),
    ));
    let engine = Arc::new(ReloadEngine::new(
        roots,
        bridge,
        broker.clone(),
        Duration::from_millis(config.reload.debounce_ms),
    ));

    Ok(App {
        config,
        context,
        builtin_routes,
        dynamic_routes,
        persistence,
        broker,
        discovery,
        engine,
    })
}

impl App {
    pub fn router(&self) -> axum::Router {
        api::routes::create_router().with_state(Arc::new(ServeState {
            builtin_routes: self.builtin_routes.clone(),
            dynamic_routes: self.dynamic_routes.clone(),
        }))
    }

    /// Start the watcher and the background reload thread, unless the
    /// development-profile gate is off.
    pub fn start_reload(&self) -> anyhow::Result<Option<ReloadTask>> {
        if !self.config.reload.enabled {
            log::info!("hot reload disabled; not watching for compiled modules");
            return Ok(None);
        }
        let paths: Vec<PathBuf> = self.config.reload.roots.iter().map(PathBuf::from).collect();
        for path in &paths {
            std::fs::create_dir_all(path)?;
        }
        let (watcher, rx) = ArtifactWatcher::subscribe(&paths)?;
        let thread = self.engine.clone().start(rx)?;
        Ok(Some(ReloadTask {
            _watcher: watcher,
            thread,
        }))
    }
}

// Function for integration testing
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with INFO level only (suppress DEBUG logs)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    // Load configuration
    let config = AppConfig::load()?;
    let app = assemble(config)?;

    // Demo beans and sample module, gated like any other seed data
    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        seed::install_demo_beans(&app.context, &app.persistence);
        if let Some(root) = app.config.reload.roots.first() {
            seed::write_demo_module(std::path::Path::new(root))?;
        }
    }

    // Claim whatever is already compiled before serving
    app.discovery.scan()?;

    let _reload = app.start_reload()?;

    let bind_address = app.config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;

    serve(listener, app.router()).await?;

    Ok(())
}
