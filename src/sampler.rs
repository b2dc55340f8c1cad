//! ==============================================================================
//! sampler.rs - bounded-window sound level sampler
//! ==============================================================================
//!
//! purpose:
//!     reads the microphone ADC as fast as it can for a fixed wall-clock window
//!     and folds the readings into one `Measurement` (min, max, mean amplitude,
//!     decibel estimate).
//!
//! blocking:
//!     `Sampler::sample` never yields. the engine runs it on a blocking thread
//!     and waits for it; nothing else in the engine executes during a window,
//!     so min/max always cover the full window.
//!
//! decibel formula:
//!     db = -9 + 20 * log10(amplitude), truncated to an integer.
//!     this is an empirical approximation, not calibrated acoustics. telemetry
//!     consumers depend on the exact numbers, keep it as is.
//!
//! ==============================================================================

use crate::error::{MonitorError, Result};
use crate::hal::HardwareProvider;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One aggregated sample window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Measurement {
    pub min_level: u16,
    pub max_level: u16,
    /// arithmetic mean of all raw readings
    pub amplitude: u16,
    pub decibel: i32,
}

/// Decibel estimate for a mean amplitude; zero has no logarithm
pub fn decibel(amplitude: u16) -> Result<i32> {
    if amplitude == 0 {
        return Err(MonitorError::InvalidAmplitude(amplitude));
    }
    Ok((-9.0 + 20.0 * f64::from(amplitude).log10()) as i32)
}

/// Running min / max / sum / count over one window
#[derive(Debug, Clone, Default)]
pub struct WindowStats {
    min: Option<u16>,
    max: Option<u16>,
    total: u64,
    samples: u64,
}

impl WindowStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: u16) {
        self.min = Some(self.min.map_or(sample, |m| m.min(sample)));
        self.max = Some(self.max.map_or(sample, |m| m.max(sample)));
        self.total += u64::from(sample);
        self.samples += 1;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Close the window. Zero samples and zero amplitude are errors, never
    /// a zero-valued measurement.
    pub fn finish(&self) -> Result<Measurement> {
        let (Some(min_level), Some(max_level)) = (self.min, self.max) else {
            return Err(MonitorError::InsufficientSamples);
        };
        // mean of u16 values always fits in u16
        let amplitude = (self.total / self.samples) as u16;
        let decibel = decibel(amplitude)?;
        Ok(Measurement { min_level, max_level, amplitude, decibel })
    }
}

impl FromIterator<u16> for WindowStats {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        let mut stats = WindowStats::new();
        for sample in iter {
            stats.push(sample);
        }
        stats
    }
}

/// Microphone + busy LED
#[derive(Clone)]
pub struct Sampler {
    hal: Arc<dyn HardwareProvider>,
    channel: u8,
    led_pin: u8,
}

impl Sampler {
    pub fn new(hal: Arc<dyn HardwareProvider>, channel: u8, led_pin: u8) -> Self {
        Self { hal, channel, led_pin }
    }

    /// Drive the busy LED. Failures only cost the visual signal.
    pub fn set_indicator(&self, on: bool) {
        if let Err(e) = self.hal.write_gpio(self.led_pin, on) {
            warn!(pin = self.led_pin, error = %e, "failed to drive busy LED");
        }
    }

    /// Read the sensor continuously for `window` and aggregate.
    ///
    /// Blocks the calling thread for the whole window. Individual failed
    /// reads are skipped; a window without any good read is
    /// `InsufficientSamples`.
    pub fn sample(&self, window: Duration) -> Result<Measurement> {
        self.set_indicator(true);

        let mut stats = WindowStats::new();
        let mut failed_reads = 0u64;
        let start = Instant::now();
        while start.elapsed() < window {
            match self.hal.read_adc(self.channel) {
                Ok(sample) => stats.push(sample),
                Err(_) => failed_reads += 1,
            }
        }

        debug!(
            total = stats.total,
            samples = stats.samples,
            failed_reads,
            window_ms = window.as_millis() as u64,
            "sample window closed"
        );
        let result = stats.finish();

        self.set_indicator(false);
        result
    }
}
