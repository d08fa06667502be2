use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkin_service::{
    config::Config,
    handlers::{router, AppState},
    services::popup_directory::PopupDirectory,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkin_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenv::dotenv().ok();
    let config = Config::from_env().expect("Failed to load configuration");

    info!("Starting check-in verification service");

    let orchestrator = config
        .build_orchestrator()
        .expect("Failed to initialize verification orchestrator");

    if orchestrator.code_engine().is_keyed() {
        info!("Rotating codes use the keyed derivation");
    }
    match &config.receipt_service_url {
        Some(url) => info!(
            "Receipt evaluator at {} (timeout {}ms, required: {})",
            url, config.receipt_timeout_ms, config.receipt_required
        ),
        None => warn!("No RECEIPT_SERVICE_URL configured; receipts will not be scored"),
    }

    let popups = PopupDirectory::new();
    match &config.popups_file {
        Some(path) => {
            let count = popups
                .load_file(path)
                .await
                .expect("Failed to load popups");
            info!("Loaded {} popup(s) from {}", count, path);
        }
        None => warn!("No POPUPS_FILE configured; every check-in will be rejected"),
    }

    let addr: std::net::SocketAddr = format!("0.0.0.0:{}", config.port)
        .parse()
        .expect("Invalid listen address");

    let state = Arc::new(AppState::new(config, orchestrator, popups));
    let app = router(state);

    info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind HTTP listener");
    axum::serve(listener, app)
        .await
        .expect("Failed to start HTTP server");

    info!("Shutting down...");
}
