use tracing::{info, warn};
use tutor_hub::api::{ApiServer, AppState};
use tutor_hub::config::AppConfig;
use tutor_hub::logging;
use zalo_oa::ZaloClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    let config = AppConfig::from_env()?;

    let (logging_config, _log_guard) = logging::init_logging(config.log_dir.as_deref())?;

    let client = ZaloClient::new(config.zalo.clone())?;
    if config.promotion_attachment_id.is_none() {
        warn!("ZALO_PROMOTION_ATTACHMENT_ID is not set, paid fallback is disabled");
    }

    let state = AppState::new(&client, config.promotion_attachment_id.clone())
        .with_logging_config(logging_config);
    let server = ApiServer::with_state(config.server.clone(), state);

    let cancel_token = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            cancel_token.cancel();
        }
    });

    info!("tutor-hub {} starting", env!("CARGO_PKG_VERSION"));
    server.run().await?;

    Ok(())
}
