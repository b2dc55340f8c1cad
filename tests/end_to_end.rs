//! Synthetic window through broadcast and request building

use sound_level_host::broadcast::{Broadcaster, Reading};
use sound_level_host::sampler::{Measurement, WindowStats};
use sound_level_host::telemetry::TelemetryConfig;
use sound_level_host::uploader::build_update_url;

#[tokio::test]
async fn test_synthetic_window_reaches_listener_and_request() {
    let config = TelemetryConfig::default();
    assert_eq!(config.host, "api.thingspeak.com");
    assert_eq!(config.port, 443);
    assert_eq!(config.sample_window_ms, 5000);

    // min 10, max 200, mean 80
    let stats: WindowStats = [10u16, 200, 90, 20, 80].into_iter().collect();
    let measurement = stats.finish().unwrap();
    assert_eq!(
        measurement,
        Measurement { min_level: 10, max_level: 200, amplitude: 80, decibel: 29 }
    );

    let broadcaster = Broadcaster::new(4);
    let mut listener = broadcaster.subscribe();
    broadcaster.publish(&measurement);
    let received = listener.recv().await.unwrap();
    assert_eq!(Reading::from(&received).to_json(), r#"{"db":29}"#);

    let url = build_update_url(&config, true, &measurement).unwrap();
    assert!(url
        .query()
        .unwrap()
        .ends_with("field1=10&field2=200&field3=80&field4=29"));
}
