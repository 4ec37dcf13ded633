//! Engine Gate - hosts the shared query engine and exposes it over HTTP.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use engine_gate::engine::{Bootstrapper, EngineRegistry};
use engine_gate::{AppState, Config};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_HASH: &str = match option_env!("GIT_HASH") {
    Some(hash) => hash,
    None => "unknown",
};

fn print_version() {
    println!("engine-gate {} ({})", VERSION, GIT_HASH);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        print_version();
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load().map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Make sure config.toml is valid or set ENGINE_GATE__SECTION__KEY environment variables.",
            e
        )
    })?;
    tracing::info!(
        "Starting engine-gate {} ({} inline bundles, manifest: {})",
        VERSION,
        config.engine.bundles.len(),
        config.engine.manifest_url.as_deref().unwrap_or("none")
    );

    // Create the engine registry; nothing starts until someone asks
    let bootstrapper = Bootstrapper::from_config(&config.engine);
    let registry = Arc::new(EngineRegistry::new(Arc::new(bootstrapper)));

    if config.engine.eager {
        tracing::info!("Eager engine initialization enabled");
        registry.request_init();
    }

    // Create shared state
    let state = Arc::new(AppState::new(config.clone(), registry));
    let app = engine_gate::app(state);

    // Start server
    let addr = format!("{}:{}", config.api.host, config.api.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
