//! ==============================================================================
//! engine.rs - the measurement-and-reporting loop driver
//! ==============================================================================
//!
//! purpose:
//!     owns the live telemetry config and the schedule state, and decides on
//!     every tick whether to sample, broadcast and upload.
//!
//! state machine (one action at a time, single logical thread):
//!
//! ```text
//!     Idle ──(sample interval elapsed)──► Sampling ──ok──► Broadcasting ──┐
//!      ▲                                     │                            │
//!      │                                   error                (upload interval
//!      │                                     │                   elapsed?)
//!      │                                     ▼                            ▼
//!      └──────────────────────────────── (report) ◄──────────────── Uploading
//! ```
//!
//! timers:
//!     both start at "never" so the first tick samples and uploads. each timer
//!     is stamped only after its action finished (successfully or not). the
//!     stamp is the time the broadcast completed, for both timers, so upload
//!     latency does not shift the upload cadence. a failed upload never
//!     touches the sample timer and vice versa.
//!
//! relationships:
//!     - uses: sampler.rs (blocking window, on a blocking thread)
//!     - uses: broadcast.rs (local fan-out)
//!     - uses: uploader.rs (Uplink trait)
//!     - uses: telemetry.rs (ConfigStore for provisioning)
//!     - used by: main.rs (tick loop), web.rs (phase for /api/status)
//!
//! ==============================================================================

use crate::broadcast::Broadcaster;
use crate::config::ScheduleConfig;
use crate::error::{MonitorError, Result};
use crate::sampler::{Measurement, Sampler};
use crate::telemetry::{ConfigStore, TelemetryConfig};
use crate::uploader::{Confirmation, Uplink};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ==============================================================================
// clock
// ==============================================================================

/// Monotonic milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Milliseconds since the clock was created
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

// ==============================================================================
// schedule state
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Sampling = 1,
    Broadcasting = 2,
    Uploading = 3,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Phase::Sampling,
            2 => Phase::Broadcasting,
            3 => Phase::Uploading,
            _ => Phase::Idle,
        }
    }
}

/// Shared view of the current phase, readable from the web server
#[derive(Clone, Default)]
pub struct PhaseHandle(Arc<AtomicU8>);

impl PhaseHandle {
    pub fn get(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, phase: Phase) {
        self.0.store(phase as u8, Ordering::Relaxed);
    }
}

/// Completion times of the last sample and upload; `None` means never
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleState {
    pub last_sample_ms: Option<u64>,
    pub last_upload_ms: Option<u64>,
}

fn elapsed(last: Option<u64>, now: u64, interval: u64) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_sub(last) >= interval,
    }
}

/// What one tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    /// Sample interval not elapsed yet
    Idle,
    /// Measurement broadcast; `upload` is set when an upload was attempted
    Sampled {
        measurement: Measurement,
        upload: Option<Result<Confirmation>>,
    },
    /// Sampling failed; nothing was broadcast or uploaded
    SampleFailed(MonitorError),
}

// ==============================================================================
// engine
// ==============================================================================

pub struct Engine<U: Uplink> {
    store: ConfigStore,
    config: TelemetryConfig,
    schedule: ScheduleConfig,
    state: ScheduleState,
    phase: PhaseHandle,
    sampler: Sampler,
    broadcaster: Broadcaster,
    uplink: U,
    clock: Box<dyn Clock>,
    show_readings: bool,
}

impl<U: Uplink> Engine<U> {
    pub fn new(
        store: ConfigStore,
        config: TelemetryConfig,
        schedule: ScheduleConfig,
        sampler: Sampler,
        broadcaster: Broadcaster,
        uplink: U,
        clock: Box<dyn Clock>,
    ) -> Self {
        for warning in schedule.warnings() {
            warn!("schedule: {}", warning);
        }
        Self {
            store,
            config,
            schedule,
            state: ScheduleState::default(),
            phase: PhaseHandle::default(),
            sampler,
            broadcaster,
            uplink,
            clock,
            show_readings: true,
        }
    }

    pub fn with_show_readings(mut self, show: bool) -> Self {
        self.show_readings = show;
        self
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub fn phase_handle(&self) -> PhaseHandle {
        self.phase.clone()
    }

    /// One-shot handoff of a complete config from the setup flow.
    ///
    /// The store validates and persists the value before it replaces the
    /// live config; on any error the live config is unchanged.
    pub fn provision(&mut self, config: TelemetryConfig) -> Result<()> {
        self.store.save(&config)?;
        info!(host = %config.host, channel = config.channel_id, "provisioned telemetry config");
        self.config = config;
        Ok(())
    }

    /// Evaluate both timers once and run whatever is due
    pub async fn tick(&mut self) -> TickReport {
        let now = self.clock.now_ms();
        if !elapsed(self.state.last_sample_ms, now, self.schedule.sample_interval_ms) {
            return TickReport::Idle;
        }

        self.phase.set(Phase::Sampling);
        let measurement = match self.run_sampler().await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "sample failed, skipping broadcast and upload");
                self.state.last_sample_ms = Some(self.clock.now_ms());
                self.phase.set(Phase::Idle);
                return TickReport::SampleFailed(e);
            }
        };
        if self.show_readings {
            info!(
                min = measurement.min_level,
                max = measurement.max_level,
                amplitude = measurement.amplitude,
                db = measurement.decibel,
                "reading"
            );
        }

        self.phase.set(Phase::Broadcasting);
        self.broadcaster.publish(&measurement);
        let finished = self.clock.now_ms();
        self.state.last_sample_ms = Some(finished);

        let mut upload = None;
        if elapsed(self.state.last_upload_ms, finished, self.schedule.upload_interval_ms) {
            self.phase.set(Phase::Uploading);
            let result = self.uplink.upload(&self.config, &measurement).await;
            if let Err(e) = &result {
                warn!(error = %e, "upload failed, retrying next interval");
            }
            // network time must not push the upload cadence back
            self.state.last_upload_ms = Some(finished);
            upload = Some(result);
        }

        self.phase.set(Phase::Idle);
        TickReport::Sampled { measurement, upload }
    }

    /// Blocking window on a dedicated thread; the engine waits for it
    async fn run_sampler(&self) -> Result<Measurement> {
        let sampler = self.sampler.clone();
        let window = Duration::from_millis(u64::from(self.config.sample_window_ms));
        debug!(window_ms = self.config.sample_window_ms, "sampling");
        tokio::task::spawn_blocking(move || sampler.sample(window))
            .await
            .map_err(|e| MonitorError::Sampler(e.to_string()))?
    }

    /// Tick until `shutdown` resolves, sleeping `poll_ms` between checks
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let poll = Duration::from_millis(self.schedule.poll_ms.max(1));
        loop {
            self.tick().await;
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(poll) => {}
            }
        }
        self.sampler.set_indicator(false);
        info!("engine stopped");
    }
}
