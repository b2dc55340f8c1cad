//! ==============================================================================
//! telemetry.rs - persisted upload target and sample window
//! ==============================================================================
//!
//! purpose:
//!     holds the five tunable parameters that survive a reboot (remote host,
//!     port, channel id, api key, sample window) and persists them as a flat
//!     json object through a file-like storage collaborator.
//!
//! on-disk format (config.json):
//!
//! ```text
//!     {"TS_HOST":"api.thingspeak.com","TS_PORT":443,"TS_CHANNEL":1234567,
//!      "TS_APIKEY":"0123456789ABCDEF","TS_SAMPLETIME":5000}
//! ```
//!
//! relationships:
//!     - used by: engine.rs (owns the live value, saves on provisioning)
//!     - used by: uploader.rs (host/port/api key)
//!     - used by: main.rs (initial load, FileStorage under [storage] root)
//!
//! ==============================================================================

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Longest accepted host name, in bytes
pub const MAX_HOST_LEN: usize = 127;
/// Longest accepted api key, in bytes
pub const MAX_API_KEY_LEN: usize = 19;
/// Shortest accepted sample window
pub const MIN_SAMPLE_WINDOW_MS: u32 = 100;
/// Longest accepted sample window; keeps the loop responsive
pub const MAX_SAMPLE_WINDOW_MS: u32 = 60_000;

/// Default location of the persisted config under the storage root
pub const DEFAULT_CONFIG_FILE: &str = "/config.json";

/// Upload target and sample window
///
/// Field names on disk are fixed; downstream tooling reads the same file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(rename = "TS_HOST")]
    pub host: String,
    #[serde(rename = "TS_PORT")]
    pub port: u16,
    #[serde(rename = "TS_CHANNEL")]
    pub channel_id: u64,
    #[serde(rename = "TS_APIKEY")]
    pub api_key: String,
    #[serde(rename = "TS_SAMPLETIME")]
    pub sample_window_ms: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            host: "api.thingspeak.com".to_string(),
            port: 443,
            channel_id: 1_234_567,
            api_key: "0123456789ABCDEF".to_string(),
            sample_window_ms: 5000,
        }
    }
}

impl TelemetryConfig {
    /// Check the field constraints; returns a human readable reason on failure
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.host.is_empty() {
            return Err("host must not be empty".into());
        }
        if self.host.len() > MAX_HOST_LEN {
            return Err(format!("host longer than {} bytes", MAX_HOST_LEN));
        }
        if self.port == 0 {
            return Err("port must be in 1..=65535".into());
        }
        if self.api_key.len() > MAX_API_KEY_LEN {
            return Err(format!("api key longer than {} bytes", MAX_API_KEY_LEN));
        }
        if !(MIN_SAMPLE_WINDOW_MS..=MAX_SAMPLE_WINDOW_MS).contains(&self.sample_window_ms) {
            return Err(format!(
                "sample window {}ms outside {}..={}ms",
                self.sample_window_ms, MIN_SAMPLE_WINDOW_MS, MAX_SAMPLE_WINDOW_MS
            ));
        }
        Ok(())
    }

    /// Parse and validate the persisted json form
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: TelemetryConfig =
            serde_json::from_slice(bytes).map_err(|e| MonitorError::ConfigParse(e.to_string()))?;
        config.validate().map_err(MonitorError::ConfigParse)?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| MonitorError::ConfigWrite(e.to_string()))
    }
}

// ==============================================================================
// storage collaborator
// ==============================================================================
// a byte-addressable file-like store. on the device this was a flash
// filesystem; here it is a directory on disk.

pub trait Storage: Send + Sync {
    /// Read the whole file; `io::ErrorKind::NotFound` when absent
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    /// Replace the whole file; readers never observe a partial write
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// Storage rooted at a directory. Paths are resolved relative to the root,
/// so "/config.json" lands at `<root>/config.json`.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        Ok(Self { root: root.as_ref().to_path_buf() })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.root.join(relative)
    }
}

impl Storage for FileStorage {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(path))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // write a sibling temp file, then rename over the target
        let mut tmp = target.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let result = std::fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .and_then(|_| std::fs::rename(&tmp, &target));
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result
    }
}

// ==============================================================================
// config store
// ==============================================================================

pub struct ConfigStore {
    storage: Box<dyn Storage>,
    path: PathBuf,
}

impl ConfigStore {
    pub fn new<P: AsRef<Path>>(storage: Box<dyn Storage>, path: P) -> Self {
        Self { storage, path: path.as_ref().to_path_buf() }
    }

    /// Read the persisted config.
    ///
    /// Missing file is `ConfigNotFound`; anything unreadable, unparseable or
    /// out of range is `ConfigParse`. The caller keeps its default on error.
    pub fn load(&self) -> Result<TelemetryConfig> {
        let bytes = match self.storage.read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persisted config");
                return Err(MonitorError::ConfigNotFound);
            }
            Err(e) => return Err(MonitorError::ConfigParse(e.to_string())),
        };
        let config = TelemetryConfig::from_json(&bytes)?;
        info!(path = %self.path.display(), host = %config.host, "loaded persisted config");
        Ok(config)
    }

    /// Persist the full config; on error the previously stored value remains.
    /// Values that would not load back are refused with `InvalidConfig`.
    pub fn save(&self, config: &TelemetryConfig) -> Result<()> {
        config.validate().map_err(MonitorError::InvalidConfig)?;
        let bytes = config.to_json()?;
        self.storage.write(&self.path, &bytes).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "failed to write config");
            MonitorError::ConfigWrite(e.to_string())
        })?;
        info!(path = %self.path.display(), "saved config");
        Ok(())
    }

    /// Load, falling back to the compiled-in default. The flag reports
    /// whether a persisted value was actually used.
    pub fn load_or_default(&self) -> (TelemetryConfig, bool) {
        match self.load() {
            Ok(config) => (config, true),
            Err(e) => {
                warn!(error = %e, "using default telemetry config");
                (TelemetryConfig::default(), false)
            }
        }
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> ConfigStore {
        let storage = FileStorage::new(dir.path()).unwrap();
        ConfigStore::new(Box::new(storage), DEFAULT_CONFIG_FILE)
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let configs = [
            TelemetryConfig::default(),
            TelemetryConfig {
                host: "h".repeat(MAX_HOST_LEN),
                port: 65535,
                channel_id: u64::MAX,
                api_key: "K".repeat(MAX_API_KEY_LEN),
                sample_window_ms: MAX_SAMPLE_WINDOW_MS,
            },
            TelemetryConfig {
                host: "10.0.0.7".into(),
                port: 1,
                channel_id: 0,
                api_key: String::new(),
                sample_window_ms: MIN_SAMPLE_WINDOW_MS,
            },
        ];
        for config in configs {
            store.save(&config).unwrap();
            assert_eq!(store.load().unwrap(), config);
        }
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&dir).load(), Err(MonitorError::ConfigNotFound));
    }

    #[test]
    fn test_missing_api_key_is_parse_error_and_default_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"TS_HOST":"example.org","TS_PORT":80,"TS_CHANNEL":42,"TS_SAMPLETIME":1000}"#,
        )
        .unwrap();
        let store = store_in(&dir);
        assert!(matches!(store.load(), Err(MonitorError::ConfigParse(_))));

        let (config, loaded) = store.load_or_default();
        assert!(!loaded);
        assert_eq!(config, TelemetryConfig::default());
    }

    #[test]
    fn test_tolerates_whitespace() {
        let text = "{\n  \"TS_HOST\" : \"example.org\",\n\t\"TS_PORT\": 8080,\n  \"TS_CHANNEL\": 7,\n  \"TS_APIKEY\": \"abc\",\n  \"TS_SAMPLETIME\": 250\n}\n";
        let config = TelemetryConfig::from_json(text.as_bytes()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.sample_window_ms, 250);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let bad = [
            r#"{"TS_HOST":"","TS_PORT":80,"TS_CHANNEL":1,"TS_APIKEY":"a","TS_SAMPLETIME":1000}"#,
            r#"{"TS_HOST":"x","TS_PORT":0,"TS_CHANNEL":1,"TS_APIKEY":"a","TS_SAMPLETIME":1000}"#,
            r#"{"TS_HOST":"x","TS_PORT":70000,"TS_CHANNEL":1,"TS_APIKEY":"a","TS_SAMPLETIME":1000}"#,
            r#"{"TS_HOST":"x","TS_PORT":80,"TS_CHANNEL":-1,"TS_APIKEY":"a","TS_SAMPLETIME":1000}"#,
            r#"{"TS_HOST":"x","TS_PORT":80,"TS_CHANNEL":1,"TS_APIKEY":"01234567890123456789","TS_SAMPLETIME":1000}"#,
            r#"{"TS_HOST":"x","TS_PORT":80,"TS_CHANNEL":1,"TS_APIKEY":"a","TS_SAMPLETIME":0}"#,
            r#"{"TS_HOST":"x","TS_PORT":80,"TS_CHANNEL":1,"TS_APIKEY":"a","TS_SAMPLETIME":1000"#,
        ];
        for text in bad {
            assert!(
                matches!(TelemetryConfig::from_json(text.as_bytes()), Err(MonitorError::ConfigParse(_))),
                "accepted {}",
                text
            );
        }
    }

    #[test]
    fn test_failed_write_keeps_previous_value() {
        struct ReadOnly(FileStorage);
        impl Storage for ReadOnly {
            fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
                self.0.read(path)
            }
            fn write(&self, _path: &Path, _bytes: &[u8]) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        store_in(&dir).save(&TelemetryConfig::default()).unwrap();

        let store = ConfigStore::new(
            Box::new(ReadOnly(FileStorage::new(dir.path()).unwrap())),
            DEFAULT_CONFIG_FILE,
        );
        let changed = TelemetryConfig { port: 8443, ..TelemetryConfig::default() };
        assert!(matches!(store.save(&changed), Err(MonitorError::ConfigWrite(_))));
        assert_eq!(store.load().unwrap(), TelemetryConfig::default());
    }

    #[test]
    fn test_invalid_config_is_refused_and_previous_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&TelemetryConfig::default()).unwrap();

        let invalid = TelemetryConfig { sample_window_ms: 0, ..TelemetryConfig::default() };
        assert!(matches!(store.save(&invalid), Err(MonitorError::InvalidConfig(_))));
        assert_eq!(store.load().unwrap(), TelemetryConfig::default());
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory where the file should go makes the rename fail
        std::fs::create_dir(dir.path().join("config.json")).unwrap();
        std::fs::write(dir.path().join("config.json").join("keep"), b"x").unwrap();

        let storage = FileStorage::new(dir.path()).unwrap();
        assert!(storage.write(Path::new(DEFAULT_CONFIG_FILE), b"{}").is_err());
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        store_in(&dir).save(&TelemetryConfig::default()).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["config.json".to_string()]);
    }
}
