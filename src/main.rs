use dotenvy::dotenv;
use tracing::info;

use payment_events::infra::{
    app::create_app, error::InfraError, grace_period_worker::run_grace_period_loop,
    setup::init_app_state, webhook_retry_worker::run_webhook_retry_loop,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let services = init_app_state().await?;
    let app_state = services.app_state;

    let bind_addr = app_state.config.bind_addr;
    let sweep_interval = app_state.config.sweep_interval_secs;
    let retry_interval = app_state.config.webhook_retry_interval_secs;
    let stripe_events = app_state.stripe_events.clone();

    // Tracing is installed here, before the workers start logging.
    let app = create_app(app_state);

    tokio::spawn(run_grace_period_loop(services.sweeper, sweep_interval));
    tokio::spawn(run_webhook_retry_loop(stripe_events, retry_interval));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(InfraError::TcpBind)?;

    info!("Backend listening at {}", &listener.local_addr()?);

    axum::serve(listener, app).await.map_err(InfraError::Server)?;

    Ok(())
}
