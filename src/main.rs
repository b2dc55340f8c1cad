//! ==============================================================================
//! main.rs - sound level host entry point
//! ==============================================================================
//!
//! purpose:
//!     glue. builds the engine from host.toml + config.json and drives it.
//!
//! responsibilities:
//!     - initialise logging (tracing-subscriber, RUST_LOG or [logging] level)
//!     - load the persisted telemetry config, fall back to defaults
//!     - hand over a provisioned config ([provision] in host.toml) once
//!     - serve /readings and /events for local listeners
//!     - run the tick loop until ctrl-c
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    rust host (this file)                     │
//!     │  ┌─────────────────────────┐     ┌───────────────────────┐  │
//!     │  │ tick loop (engine.rs)   │     │ web server (web.rs)   │  │
//!     │  │ sample 10s / upload 30s │     │ /readings  /events    │  │
//!     │  └──┬─────────┬─────────┬──┘     └───────────┬───────────┘  │
//!     │     │         │         │                    │              │
//!     │  sampler  broadcaster ──┼────────────────────┘              │
//!     │     │                uploader                               │
//!     └─────┼───────────────────┼───────────────────────────────────┘
//!           ▼                   ▼
//!     mcp3208 + led        telemetry endpoint (https GET /update)
//!
//! ==============================================================================

use anyhow::Result;
use sound_level_host::{
    broadcast::Broadcaster,
    config::HostConfig,
    engine::{Engine, SystemClock},
    hal::{Hal, HardwareProvider},
    sampler::Sampler,
    telemetry::{ConfigStore, FileStorage},
    uploader::HttpUplink,
    web::{self, WebState},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Sound Level Host");
    println!("  \"Sample, Broadcast, Upload\"");
    println!("===========================================================");

    // step 1: load configuration
    let config = HostConfig::load_or_default();
    config.print_summary();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // step 2: hardware, busy LED on during setup
    let hal: Arc<dyn HardwareProvider> = Arc::new(Hal::new(&config.hardware)?);
    if let Err(e) = hal.set_gpio_mode(config.hardware.led_pin, "output") {
        warn!(error = %e, "could not configure LED pin");
    }
    let sampler = Sampler::new(hal, config.hardware.sound_channel, config.hardware.led_pin);
    sampler.set_indicator(true);

    // step 3: persisted telemetry config
    let storage = FileStorage::new(&config.storage.root)?;
    let store = ConfigStore::new(Box::new(storage), &config.storage.config_file);
    let (telemetry, loaded) = store.load_or_default();

    // step 4: engine
    let broadcaster = Broadcaster::new(config.web.channel_capacity);
    let uplink = HttpUplink::new(&config.upload)?;
    let mut engine = Engine::new(
        store,
        telemetry,
        config.schedule.clone(),
        sampler.clone(),
        broadcaster.clone(),
        uplink,
        Box::new(SystemClock::new()),
    )
    .with_show_readings(config.logging.show_readings);

    match config.provision.clone() {
        Some(provisioned) => {
            if let Err(e) = engine.provision(provisioned) {
                error!(error = %e, "provisioned config rejected, keeping current one");
            }
        }
        None if !loaded => warn!("no stored telemetry config: running with defaults until provisioned"),
        None => {}
    }
    info!(
        host = %engine.config().host,
        port = engine.config().port,
        channel = engine.config().channel_id,
        window_ms = engine.config().sample_window_ms,
        "telemetry target"
    );

    // step 5: web server in background
    let web_state = WebState { broadcaster, phase: engine.phase_handle() };
    let bind = config.web.bind.clone();
    tokio::spawn(async move {
        if let Err(e) = web::run_server(&bind, web_state).await {
            error!("Web server error: {}", e);
        }
    });

    // step 6: tick loop
    sampler.set_indicator(false);
    println!("\n[RUNTIME] Starting sound sampling ({}ms interval)", config.schedule.sample_interval_ms);
    println!("────────────────────────────────────────────────────────────");

    engine
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
