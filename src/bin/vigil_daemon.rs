use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vigil::config::Config;
use vigil::engine::queue::{run_worker, IngestQueue};
use vigil::engine::SecurityEngine;
use vigil::geolocation::GeoIpService;
use vigil::input::AsyncEventTailer;
use vigil::notify::{NotificationDispatcher, NotificationQueue};
use vigil::persistence::SqliteAlertStore;

/// Main daemon entry point for the vigil security engine
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting vigil daemon...");

    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };

    // Setup graceful shutdown signal handling
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    // Open alert storage
    let store = Arc::new(SqliteAlertStore::new(&config.storage.db_path)?);
    log::info!("Alert database: {:?}", config.storage.db_path);

    let mut engine = SecurityEngine::new(config.thresholds.clone(), store)?;

    // Optional GeoIP database for the impossible-travel rule
    if let Some(ref path) = config.geoip.db_path {
        match GeoIpService::new(path) {
            Ok(service) => {
                log::info!("GeoIP database loaded: {:?}", path);
                engine = engine.with_geoip(service);
            }
            Err(e) => log::warn!("GeoIP database unavailable ({}), continuing without", e),
        }
    }

    // Notification dispatcher for user-facing warnings
    let mut dispatcher_handle = None;
    if config.notify.enabled {
        let (tx, rx) = NotificationDispatcher::create_channel();
        let dispatcher = NotificationDispatcher::new(config.notify.clone());
        dispatcher_handle = Some(tokio::spawn(dispatcher.run(rx)));
        engine = engine.with_notifications(NotificationQueue::new(tx));
        log::info!("Notification dispatch enabled");
    }

    let engine = Arc::new(engine);

    // Analysis worker draining the ingest queue
    let (queue, rx) = IngestQueue::new();
    let worker = tokio::spawn(run_worker(Arc::clone(&engine), rx));

    // Tail the application event file into the queue
    let event_file = config.input.event_file.clone();
    let tailer_queue = queue.clone();
    let tailer_handle = tokio::spawn(async move {
        let mut tailer = AsyncEventTailer::new(event_file);
        if let Err(e) = tailer.run(tailer_queue).await {
            log::error!("Event tailer failed: {}", e);
        }
    });

    log::info!("Daemon running. Press Ctrl+C to stop.");

    // Periodic maintenance until shutdown
    let mut last_prune = std::time::Instant::now();
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if last_prune.elapsed() >= Duration::from_secs(60) {
            engine.prune_stale();
            last_prune = std::time::Instant::now();
        }
    }

    // Drop our sender so the worker drains and exits
    tailer_handle.abort();
    drop(queue);
    worker.await?;
    if let Some(handle) = dispatcher_handle {
        handle.abort();
    }

    log::info!("vigil daemon stopped");
    Ok(())
}
