use super::*;
use crate::config::{SensorConfig, SimulationConfig};
use crate::error::SensorError;
use crate::frame::{FRAME_HEIGHT, FRAME_WIDTH, LOW_AMPLITUDE};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn mock_link(value: u16) -> (SensorLink, MockSensorHandle) {
    let (sensor, handle) = MockSensor::uniform(value);
    let link = SensorLinkBuilder::new()
        .config(SensorConfig::default())
        .sensor(Box::new(sensor))
        .build()
        .unwrap();
    (link, handle)
}

#[test]
fn test_port_parsing() {
    assert_eq!(
        "/dev/ttyACM0".parse::<SensorPort>().unwrap(),
        SensorPort::Usb("/dev/ttyACM0".to_string())
    );
    let port: SensorPort = "tcp://192.168.0.10:12345".parse().unwrap();
    assert_eq!(
        port,
        SensorPort::Ethernet {
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 0, 10)),
            port: 12345
        }
    );
    assert_eq!(port.to_string(), "tcp://192.168.0.10:12345");

    assert!("tcp://192.168.0.10".parse::<SensorPort>().is_err());
    assert!("tcp://not-an-ip:80".parse::<SensorPort>().is_err());
    assert!("".parse::<SensorPort>().is_err());
}

#[test]
fn test_builder_requires_config() {
    assert!(SensorLinkBuilder::new().build().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_connect_stream_capture() {
    let (mut link, handle) = mock_link(1000);
    assert_eq!(link.state(), ConnectionState::Disconnected);

    link.connect().await.unwrap();
    assert_eq!(link.state(), ConnectionState::Connected);
    assert_eq!(handle.filters_applied(), 1);

    link.start_streaming().await.unwrap();
    assert_eq!(link.state(), ConnectionState::Streaming);
    assert!(link.is_connected());

    let first = link.capture_once().await.unwrap();
    let second = link.capture_once().await.unwrap();
    assert_eq!(first.width, FRAME_WIDTH);
    assert_eq!(first.height, FRAME_HEIGHT);
    assert!(second.id > first.id);
    assert_eq!(first.data[0], 1000);
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent_with_settle_delay() {
    let (mut link, handle) = mock_link(1000);
    link.connect().await.unwrap();
    link.start_streaming().await.unwrap();

    let started = Instant::now();
    link.connect().await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(handle.connect_calls(), 2);
    assert_eq!(handle.disconnect_calls(), 1);
    assert_eq!(handle.stop_calls(), 1);
    assert_eq!(link.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_connect_failure_leaves_disconnected() {
    let (mut link, handle) = mock_link(1000);
    handle.set_unreachable(true);

    let err = link.connect().await.unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert_eq!(
        link.start_streaming().await.unwrap_err(),
        SensorError::NotConnected
    );
}

#[tokio::test]
async fn test_start_failure_keeps_connected() {
    let (mut link, handle) = mock_link(1000);
    link.connect().await.unwrap();
    handle.drop_connection();

    assert!(link.start_streaming().await.is_err());
    assert_eq!(link.state(), ConnectionState::Connected);
    assert!(!link.is_connected());
}

#[tokio::test]
async fn test_capture_failures_counted_and_reset() {
    let (mut link, handle) = mock_link(1000);
    link.connect().await.unwrap();
    link.start_streaming().await.unwrap();

    handle.push_capture_errors(2);
    assert!(link.capture_once().await.is_err());
    assert!(link.capture_once().await.is_err());
    assert_eq!(link.consecutive_failures(), 2);

    link.capture_once().await.unwrap();
    assert_eq!(link.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_on_demand_capture_leaves_failure_count() {
    let (mut link, handle) = mock_link(1000);
    link.connect().await.unwrap();
    link.start_streaming().await.unwrap();

    handle.push_capture_errors(2);
    assert!(link.capture_once().await.is_err());
    assert!(link.capture_on_demand().await.is_err());
    assert_eq!(link.consecutive_failures(), 1);

    // A good on-demand frame does not reset the cycle count either
    link.capture_on_demand().await.unwrap();
    assert_eq!(link.consecutive_failures(), 1);
}

#[tokio::test]
async fn test_capture_rejects_bad_frames() {
    let (mut link, handle) = mock_link(1000);
    link.connect().await.unwrap();
    link.start_streaming().await.unwrap();

    handle.push_capture(MockCapture::Frame(vec![1000; 10]));
    assert!(matches!(
        link.capture_once().await,
        Err(SensorError::CaptureFailed { .. })
    ));

    assert_eq!(
        SensorLink::new(
            Box::new(MockSensor::new().0),
            SensorPort::Usb("x".into()),
            &SensorConfig::default()
        )
        .capture_once()
        .await
        .unwrap_err(),
        SensorError::NotConnected
    );
}

#[tokio::test(start_paused = true)]
async fn test_capture_timeout() {
    let (mut link, handle) = mock_link(1000);
    link.connect().await.unwrap();
    link.start_streaming().await.unwrap();

    handle.push_capture(MockCapture::Hang);
    let err = link.capture_once().await.unwrap_err();
    assert_eq!(
        err,
        SensorError::CaptureTimeout {
            timeout: Duration::from_millis(2000)
        }
    );
    assert_eq!(link.consecutive_failures(), 1);
}

#[tokio::test]
async fn test_teardown_closes_link() {
    let (mut link, handle) = mock_link(1000);
    link.connect().await.unwrap();
    link.start_streaming().await.unwrap();

    link.teardown().await;
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert!(!handle.is_connected());
    assert_eq!(handle.stop_calls(), 1);

    // Already down: nothing to do
    link.teardown().await;
    assert_eq!(handle.disconnect_calls(), 1);
}

#[tokio::test]
async fn test_event_handler_forwarded() {
    let (mut link, handle) = mock_link(1000);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    link.register_event_handler(Arc::new(move |event| {
        if event == SensorEvent::Disconnected {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));

    assert!(handle.has_event_handler());
    handle.fire_event(SensorEvent::Disconnected);
    handle.fire_event(SensorEvent::SystemException { details: None });
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_simulated_sensor_frames() {
    let config = SensorConfig {
        simulation: SimulationConfig {
            fail_every: 3,
            ..SimulationConfig::default()
        },
        ..SensorConfig::default()
    };
    let mut link = SensorLinkBuilder::new().config(config).build().unwrap();

    link.connect().await.unwrap();
    link.start_streaming().await.unwrap();

    let frame = link.capture_once().await.unwrap();
    assert!(frame.validate_size());
    assert_eq!(frame.pixel(80, 30), Some(1500));
    assert!(frame.data.iter().any(|&raw| raw == LOW_AMPLITUDE));

    link.capture_once().await.unwrap();
    assert!(link.capture_once().await.is_err());
}
