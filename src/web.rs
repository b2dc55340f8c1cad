//! ==============================================================================
//! web.rs - local listener endpoints
//! ==============================================================================
//!
//! routes:
//!     GET /readings    latest value, {"db": N} ({"db": 0} before the first one)
//!     GET /events      server-sent events: "hello!" on connect, then per
//!                      measurement a "ping" message and a "new_readings"
//!                      event carrying {"db": N}
//!     GET /api/status  latest full measurement, counters and engine phase
//!
//! relationships:
//!     - reads: broadcast.rs (latest value, subscription per listener)
//!     - reads: engine.rs (PhaseHandle)
//!     - used by: main.rs (spawned next to the tick loop)
//!
//! ==============================================================================

use crate::broadcast::{Broadcaster, Reading};
use crate::engine::{Phase, PhaseHandle};
use crate::sampler::Measurement;
use anyhow::Result;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    response::Json,
    routing::get,
    Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct WebState {
    pub broadcaster: Broadcaster,
    pub phase: PhaseHandle,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub latest: Option<Measurement>,
    pub reading: Reading,
    pub published: u64,
    pub listeners: usize,
    pub phase: Phase,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/readings", get(readings_handler))
        .route("/events", get(events_handler))
        .route("/api/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(bind: &str, state: WebState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("listeners served at http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn event_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
        .to_string()
}

async fn readings_handler(State(state): State<WebState>) -> Json<Reading> {
    Json(state.broadcaster.latest_reading())
}

async fn events_handler(
    State(state): State<WebState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    tracing::debug!(listeners = state.broadcaster.listener_count(), "listener connected");

    let hello = Event::default()
        .data("hello!")
        .id(event_id())
        .retry(Duration::from_secs(10));

    let readings = BroadcastStream::new(rx)
        // a lagging listener just skips what it missed
        .filter_map(|msg| async move { msg.ok() })
        .flat_map(|m| {
            let reading = Reading::from(&m);
            stream::iter([
                Ok::<_, Infallible>(Event::default().data("ping").id(event_id())),
                Ok(Event::default().event("new_readings").data(reading.to_json()).id(event_id())),
            ])
        });

    let stream = stream::once(async move { Ok::<_, Infallible>(hello) }).chain(readings);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn status_handler(State(state): State<WebState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        latest: state.broadcaster.latest(),
        reading: state.broadcaster.latest_reading(),
        published: state.broadcaster.published_count(),
        listeners: state.broadcaster.listener_count(),
        phase: state.phase.get(),
    })
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    async fn serve(state: WebState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn state() -> WebState {
        WebState { broadcaster: Broadcaster::new(8), phase: PhaseHandle::default() }
    }

    fn measurement() -> Measurement {
        Measurement { min_level: 10, max_level: 200, amplitude: 80, decibel: 29 }
    }

    #[tokio::test]
    async fn test_readings_before_and_after_first_sample() {
        let state = state();
        let base = serve(state.clone()).await;

        let body = reqwest::get(format!("{}/readings", base)).await.unwrap().text().await.unwrap();
        assert_eq!(body, r#"{"db":0}"#);

        state.broadcaster.publish(&measurement());
        let body = reqwest::get(format!("{}/readings", base)).await.unwrap().text().await.unwrap();
        assert_eq!(body, r#"{"db":29}"#);
    }

    #[tokio::test]
    async fn test_events_stream_delivers_new_readings() {
        let state = state();
        let base = serve(state.clone()).await;

        let mut response = reqwest::get(format!("{}/events", base)).await.unwrap();
        let mut seen = String::new();
        while !seen.contains("hello!") {
            let chunk = response.chunk().await.unwrap().unwrap();
            seen.push_str(&String::from_utf8_lossy(&chunk));
        }

        state.broadcaster.publish(&measurement());
        while !seen.contains(r#"{"db":29}"#) {
            let chunk = response.chunk().await.unwrap().unwrap();
            seen.push_str(&String::from_utf8_lossy(&chunk));
        }
        assert!(seen.contains("ping"));
        assert!(seen.contains("new_readings"));
    }

    #[tokio::test]
    async fn test_status() {
        let state = state();
        let base = serve(state.clone()).await;
        state.broadcaster.publish(&measurement());

        let status: serde_json::Value = reqwest::get(format!("{}/api/status", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["latest"]["amplitude"], 80);
        assert_eq!(status["reading"]["db"], 29);
        assert_eq!(status["published"], 1);
        assert_eq!(status["phase"], "idle");
    }
}
