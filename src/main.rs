use anyhow::Result;
use helios::config::Config;
use helios::driver::WallboxController;
use helios::ha::{EntityStore, HomeAssistantClient};
use helios::logging::{get_logger, init_logging};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config: {}", e))?;

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;
    let logger = get_logger("main");
    logger.info(&format!(
        "Helios {} starting, Home Assistant at {}",
        env!("APP_VERSION"),
        config.home_assistant.base_url
    ));

    let client = HomeAssistantClient::from_config(&config.home_assistant)
        .map_err(|e| anyhow::anyhow!("Failed to create Home Assistant client: {}", e))?;
    let store: Arc<dyn EntityStore> = Arc::new(client);
    let mut controller = WallboxController::new(config.clone(), store);

    #[cfg(feature = "web")]
    let web_task = if config.web.enabled {
        let state = helios::web::AppState::from_controller(&controller);
        let (host, port) = (config.web.host.clone(), config.web.port);
        Some(tokio::spawn(async move {
            if let Err(e) = helios::web::serve(state, &host, port).await {
                error!("Web server error: {}", e);
            }
        }))
    } else {
        None
    };

    let shutdown = controller.get_shutdown_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            let _ = shutdown.send(());
        }
    });

    let result = controller.run().await;

    #[cfg(feature = "web")]
    if let Some(task) = web_task {
        task.abort();
    }

    match result {
        Ok(()) => {
            info!("Controller shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Controller failed with error: {}", e);
            Err(anyhow::anyhow!("Controller error: {}", e))
        }
    }
}
