//! ==============================================================================
//! broadcast.rs - fan-out of fresh measurements to local listeners
//! ==============================================================================
//!
//! purpose:
//!     every measurement the engine produces is pushed to all connected
//!     listeners (server-sent events) and cached as "latest" for synchronous
//!     requests (/readings).
//!
//! wire format:
//!     {"db": <integer>}
//!
//! ordering:
//!     a single tokio broadcast channel carries the measurements, so every
//!     receiver sees them in publish order. a listener that falls more than
//!     `capacity` measurements behind skips the oldest ones instead of slowing
//!     down the engine.
//!
//! ==============================================================================

use crate::sampler::Measurement;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// What listeners receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reading {
    pub db: i32,
}

impl From<&Measurement> for Reading {
    fn from(m: &Measurement) -> Self {
        Self { db: m.decibel }
    }
}

impl Reading {
    pub fn to_json(&self) -> String {
        serde_json::json!({ "db": self.db }).to_string()
    }
}

struct Inner {
    tx: broadcast::Sender<Measurement>,
    latest: RwLock<Option<Measurement>>,
    published: AtomicU64,
}

/// Clone-able handle shared by the engine (writer) and the web server (readers)
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                tx,
                latest: RwLock::new(None),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Push to every listener. Never blocks and never fails: having no
    /// listeners, or listeners that lag, is not the engine's problem.
    pub fn publish(&self, measurement: &Measurement) {
        {
            let mut latest = self.inner.latest.write().unwrap_or_else(|e| e.into_inner());
            *latest = Some(*measurement);
        }
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        match self.inner.tx.send(*measurement) {
            Ok(listeners) => debug!(listeners, db = measurement.decibel, "broadcast reading"),
            Err(_) => debug!(db = measurement.decibel, "no listeners connected"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Measurement> {
        self.inner.tx.subscribe()
    }

    pub fn latest(&self) -> Option<Measurement> {
        *self.inner.latest.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Latest value in listener format; `{"db":0}` before the first sample
    pub fn latest_reading(&self) -> Reading {
        self.latest().as_ref().map(Reading::from).unwrap_or(Reading { db: 0 })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }

    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }
}
