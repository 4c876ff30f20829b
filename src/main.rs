use anyhow::Context;
use banking_api::infrastructure::{
    init::init_all_services, logging::init_logging, shutdown::shutdown_signal, AppConfig,
};
use banking_api::web::routes::create_router;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    // Held until exit so the file writer flushes.
    let _log_guard = init_logging(&config.logging)?;

    info!("Starting banking API");

    let services = init_all_services(&config)?;
    let app = create_router(services.app_state(), &config.cors_allowed_origins);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
