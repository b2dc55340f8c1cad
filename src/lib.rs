//! ==============================================================================
//! lib.rs - sound level host
//! ==============================================================================
//!
//! purpose:
//!     samples a microphone, derives a decibel estimate, serves the latest
//!     reading to local listeners and periodically uploads it to a remote
//!     telemetry endpoint.
//!
//! modules (leaf first):
//!     - error:     failure taxonomy shared by everything below
//!     - telemetry: persisted upload target + sample window (config.json)
//!     - config:    runtime settings (host.toml)
//!     - hal:       ADC + GPIO, mock or rppal
//!     - sampler:   blocking window -> Measurement
//!     - broadcast: fan-out to local listeners
//!     - uploader:  remote update request
//!     - engine:    dual-interval tick loop
//!     - web:       /readings, /events, /api/status
//!
//! ==============================================================================

pub mod broadcast;
pub mod config;
pub mod engine;
pub mod error;
pub mod hal;
pub mod sampler;
pub mod telemetry;
pub mod uploader;
pub mod web;

pub use error::{MonitorError, Result};
