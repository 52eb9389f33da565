use std::{
    process,
    sync::{Arc, OnceLock},
    time::Duration,
};

use camlink::{
    config::Config,
    core::{
        capture::{CaptureCycle, FileCamera, LinkUploader, Uploader},
        executor::{join_logged, CaptureExecutor},
        readiness::Readiness,
        storage::DirectoryStore,
    },
    logger::LoggerManager,
    print_error,
};
use camlink_iot::IotManager;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config();
    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting camlink version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", cfg.capture);

    let manager = IotManager::new(cfg.device.clone()).unwrap_or_else(|e| {
        error!("Failed to create IotManager: {}", e);
        process::exit(1);
    });

    let readiness = Readiness::default();
    readiness.start_listening(manager.subscribe_state());

    let handle = manager.handle();
    let cancel = CancellationToken::new();
    let core = tokio::spawn(manager.run(cancel.clone()));

    let capture = if cfg.capture.enabled {
        let uploader = cfg
            .capture
            .public_url
            .as_ref()
            .map(|url| Arc::new(LinkUploader::new(url.as_str())) as Arc<dyn Uploader>);
        if uploader.is_none() {
            info!("No public_url configured, images are kept local only");
        }

        let cycle = CaptureCycle::new(
            Arc::new(FileCamera::new(&cfg.capture.frame_path)),
            Arc::new(DirectoryStore::new(&cfg.capture.store_dir)),
            uploader,
            Arc::new(handle),
            cfg.capture.property_key.clone(),
        );
        let executor = CaptureExecutor::new(
            cycle,
            Duration::from_secs(cfg.capture.interval),
            readiness,
        );
        info!("Starting capture executor...");
        Some(tokio::spawn(executor.run(cancel.clone())))
    } else {
        info!("Capture disabled");
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, initiating graceful shutdown...");
    cancel.cancel();

    if let Some(capture) = capture {
        join_logged("Capture", capture).await;
    }
    join_logged("Messaging core", core).await;

    info!("Shutdown complete");
    Ok(())
}
