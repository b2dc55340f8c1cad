//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ScheduleConfig: sample/broadcast interval and upload interval.
//!     - HardwareConfig: ADC channel of the microphone, busy LED pin, SPI clock.
//!     - StorageConfig: where config.json lives.
//!     - WebConfig: listener address for /readings and /events.
//!     - UploadConfig: transport hardening for the telemetry upload.
//!     - LoggingConfig: log level and per-reading output.
//!     - provision: optional one-shot telemetry config handoff.
//!
//! note:
//!     this file is NOT the persisted upload target. that lives in
//!     config.json and is owned by telemetry.rs.
//!
//! ==============================================================================

use crate::telemetry::{TelemetryConfig, DEFAULT_CONFIG_FILE};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HostConfig {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Values entered during setup; saved to config.json on startup
    #[serde(default)]
    pub provision: Option<TelemetryConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    /// sample + broadcast every this many ms
    pub sample_interval_ms: u64,
    /// upload every this many ms; meant to be a multiple of the sample interval
    pub upload_interval_ms: u64,
    /// how long the loop sleeps between tick checks
    pub poll_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { sample_interval_ms: 10_000, upload_interval_ms: 30_000, poll_ms: 50 }
    }
}

impl ScheduleConfig {
    /// Human readable problems with the interval relationship. These are
    /// reported, never corrected.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.sample_interval_ms == 0 {
            out.push("sample_interval_ms is 0: sampling back to back".to_string());
            return out;
        }
        if self.upload_interval_ms < self.sample_interval_ms {
            out.push(format!(
                "upload_interval_ms ({}) < sample_interval_ms ({}): uploads happen on every sample",
                self.upload_interval_ms, self.sample_interval_ms
            ));
        } else if self.upload_interval_ms % self.sample_interval_ms != 0 {
            out.push(format!(
                "upload_interval_ms ({}) is not a multiple of sample_interval_ms ({})",
                self.upload_interval_ms, self.sample_interval_ms
            ));
        }
        out
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HardwareConfig {
    /// MCP3208 channel the microphone is wired to
    pub sound_channel: u8,
    /// BCM pin of the busy LED
    pub led_pin: u8,
    pub spi_clock_hz: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self { sound_channel: 0, led_pin: 5, spi_clock_hz: 1_000_000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub root: String,
    pub config_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root: "data".to_string(), config_file: DEFAULT_CONFIG_FILE.to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub bind: String,
    /// measurements buffered per listener before a slow one starts lagging
    pub channel_capacity: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".to_string(), channel_capacity: 16 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    /// upper bound for connect + request + response
    pub timeout_ms: u64,
    pub tls: bool,
    pub accept_invalid_certs: bool,
    pub user_agent: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            tls: true,
            accept_invalid_certs: false,
            user_agent: "Sound-Sensor".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_readings: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_readings: true }
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("host.toml"),
            std::path::PathBuf::from("..").join("config").join("host.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│           HOST CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Sample Interval: {}ms", self.schedule.sample_interval_ms);
        println!("│ Upload Interval: {}ms", self.schedule.upload_interval_ms);
        println!("│ Sound Channel: {} | LED Pin: {}", self.hardware.sound_channel, self.hardware.led_pin);
        println!("│ Storage: {}{}", self.storage.root, self.storage.config_file);
        println!("│ Web: {}", self.web.bind);
        println!("│ Log Level: {}", self.logging.level);
        println!("├─────────────────────────────────────────┤");
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = HostConfig::parse("").unwrap();
        assert_eq!(config.schedule.sample_interval_ms, 10_000);
        assert_eq!(config.schedule.upload_interval_ms, 30_000);
        assert_eq!(config.hardware.led_pin, 5);
        assert_eq!(config.storage.config_file, "/config.json");
        assert!(config.provision.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = HostConfig::parse(
            r#"
[schedule]
upload_interval_ms = 60000

[upload]
tls = false
"#,
        )
        .unwrap();
        assert_eq!(config.schedule.sample_interval_ms, 10_000);
        assert_eq!(config.schedule.upload_interval_ms, 60_000);
        assert!(!config.upload.tls);
        assert_eq!(config.upload.user_agent, "Sound-Sensor");
    }

    #[test]
    fn test_provision_section_uses_persisted_keys() {
        let config = HostConfig::parse(
            r#"
[provision]
TS_HOST = "telemetry.local"
TS_PORT = 8080
TS_CHANNEL = 99
TS_APIKEY = "SECRET"
TS_SAMPLETIME = 2000
"#,
        )
        .unwrap();
        let provision = config.provision.unwrap();
        assert_eq!(provision.host, "telemetry.local");
        assert_eq!(provision.port, 8080);
        assert_eq!(provision.sample_window_ms, 2000);
    }

    #[test]
    fn test_schedule_warnings() {
        assert!(ScheduleConfig::default().warnings().is_empty());

        let short = ScheduleConfig { upload_interval_ms: 5_000, ..ScheduleConfig::default() };
        assert_eq!(short.warnings().len(), 1);

        let odd = ScheduleConfig { upload_interval_ms: 25_000, ..ScheduleConfig::default() };
        assert!(odd.warnings()[0].contains("not a multiple"));
    }
}
