use super::*;
use crate::acquisition::{capture_channel, AcquisitionLoop};
use crate::config::ServiceConfig;
use crate::error::PublishError;
use crate::flags::FlagsSnapshot;
use crate::frame::{Frame, SentinelFilter, FRAME_HEIGHT, FRAME_WIDTH, INVALID_DATA};
use crate::sampler::{PointMeasurement, SamplePoint};
use crate::sensor::{MockSensor, MockSensorHandle, SensorLinkBuilder};
use crate::service::ServiceContext;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;

fn context(active: bool) -> Arc<ServiceContext> {
    let mut config = ServiceConfig::default();
    config.acquisition.start_active = active;
    config.sampling.min_valid_pixels = 6;
    ServiceContext::new(config, vec![SamplePoint::new("point_1", 40, 30)])
}

/// Acquisition loop over a mock sensor plus a publish loop writing to memory
fn start_service(
    context: &Arc<ServiceContext>,
    sensor: MockSensor,
) -> (MemorySink, tokio::task::JoinHandle<()>) {
    let link = SensorLinkBuilder::new()
        .config(context.config.sensor.clone())
        .sensor(Box::new(sensor))
        .build()
        .unwrap();
    let (requester, requests) = capture_channel(4);
    tokio::spawn(AcquisitionLoop::new(Arc::clone(context), link, requests).run());

    let sink = MemorySink::new();
    let publisher = PublishLoop::new(Arc::clone(context), requester).with_sink(Arc::new(sink.clone()));
    let task = tokio::spawn(publisher.run());
    (sink, task)
}

fn window_frame(handle: &MockSensorHandle, value: u16) {
    let mut data = vec![INVALID_DATA; (FRAME_WIDTH * FRAME_HEIGHT) as usize];
    for y in 28..=32u32 {
        for x in 38..=42u32 {
            data[(y * FRAME_WIDTH + x) as usize] = value;
        }
    }
    handle.set_default_frame(data);
}

struct RejectingSink;

#[async_trait]
impl OutputSink for RejectingSink {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn publish(&self, _channel: Channel, _payload: &str) -> Result<(), PublishError> {
        Err(PublishError::Rejected {
            topic: "test".to_string(),
            details: "queue full".to_string(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_measurement_json() {
    let context = context(true);
    let (sensor, handle) = MockSensor::new();
    window_frame(&handle, 1000);
    let (sink, _task) = start_service(&context, sensor);

    sleep(Duration::from_millis(2500)).await;

    let payloads = sink.payloads(Channel::Measurements);
    let latest = payloads.last().unwrap();
    assert!(latest.contains("\"distance_mm\":1000.0"));
    assert!(latest.contains("\"valid\":true"));
    assert!(latest.contains("\"valid_pixels\":25"));

    let json: Value = serde_json::from_str(latest).unwrap();
    assert_eq!(json["active"], true);
    assert_eq!(json["device_connected"], true);
    assert_eq!(json["power_save_mode"], false);
    let point = &json["measurements"]["point_1"];
    assert_eq!(point["distance_m"], 1.0);
    assert_eq!(point["min_distance_mm"], 1000.0);
    assert_eq!(point["coordinates"]["x"], 40);
    assert_eq!(point["coordinates"]["y"], 30);
    assert!(point["age_seconds"].is_u64());
}

#[tokio::test(start_paused = true)]
async fn test_inactive_publishes_nothing() {
    let context = context(false);
    let (sensor, _handle) = MockSensor::uniform(1000);
    let (sink, _task) = start_service(&context, sensor);

    sleep(Duration::from_secs(5)).await;
    assert!(sink.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pointcloud_request_cleared_when_sensor_down() {
    let context = context(true);
    let (sensor, handle) = MockSensor::uniform(1000);
    handle.set_unreachable(true);
    context.flags.request_pointcloud();
    let (sink, task) = start_service(&context, sensor);

    sleep(Duration::from_millis(2100)).await;

    assert!(!context.flags.pointcloud_requested());
    assert!(sink.payloads(Channel::PointCloud).is_empty());
    assert!(!task.is_finished());
    assert_eq!(handle.capture_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pointcloud_request_cleared_after_timeout() {
    let context = context(true);
    // Nobody serves the channel
    let (requester, _requests) = capture_channel(1);
    let sink = MemorySink::new();
    let publisher = PublishLoop::new(Arc::clone(&context), requester).with_sink(Arc::new(sink.clone()));

    context.flags.request_pointcloud();
    publisher.tick().await;

    assert!(!context.flags.pointcloud_requested());
    assert!(sink.payloads(Channel::PointCloud).is_empty());
    assert_eq!(sink.payloads(Channel::Measurements).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pointcloud_published_on_request() {
    let context = context(true);
    let (sensor, _handle) = MockSensor::uniform(750);
    let (sink, _task) = start_service(&context, sensor);

    sleep(Duration::from_millis(100)).await;
    context.flags.request_pointcloud();
    sleep(Duration::from_secs(2)).await;

    let clouds = sink.payloads(Channel::PointCloud);
    assert_eq!(clouds.len(), 1);
    let json: Value = serde_json::from_str(&clouds[0]).unwrap();
    assert_eq!(json["width"], 160);
    assert_eq!(json["height"], 60);
    assert_eq!(json["truncated"], false);
    assert_eq!(json["total_points"], 9600);
    assert_eq!(json["data"].as_array().unwrap().len(), 9600);
    assert_eq!(json["data"][161], serde_json::json!({"x": 1, "y": 1, "d": 750}));
    assert!(!context.flags.pointcloud_requested());
}

#[tokio::test(start_paused = true)]
async fn test_failing_sink_does_not_block_others() {
    let context = context(true);
    let (requester, _requests) = capture_channel(1);
    let sink = MemorySink::new();
    let publisher = PublishLoop::new(Arc::clone(&context), requester)
        .with_sink(Arc::new(RejectingSink))
        .with_sink(Arc::new(sink.clone()));

    publisher.tick().await;
    publisher.tick().await;
    assert_eq!(sink.payloads(Channel::Measurements).len(), 2);
}

#[test]
fn test_measurement_report_rounding_and_age() {
    let now = SystemTime::now();
    let point = SamplePoint::new("door", 40, 30);

    let mut measured = PointMeasurement::unmeasured(&point);
    measured.distance_mm = 1234.5678;
    measured.min_distance_mm = 1200.04;
    measured.max_distance_mm = 1300.06;
    measured.valid_pixels = 20;
    measured.valid = true;
    measured.updated_at = Some(now - Duration::from_secs(3));

    let never = PointMeasurement::unmeasured(&SamplePoint::new("window", 120, 30));

    let flags = FlagsSnapshot {
        active: true,
        pointcloud_requested: false,
        broker_connected: true,
        device_connected: true,
        power_save: false,
        connection_retries: 2,
    };
    let report = MeasurementReport::build(&[measured, never], flags, now);

    let door = &report.measurements["door"];
    assert_eq!(door.distance_mm, 1234.6);
    assert_eq!(door.distance_m, 1.235);
    assert_eq!(door.min_distance_mm, 1200.0);
    assert_eq!(door.max_distance_mm, 1300.1);
    assert_eq!(door.age_seconds, Some(3));
    assert_eq!(report.connection_retries, 2);

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["measurements"]["window"]["age_seconds"].is_null());
    assert_eq!(json["measurements"]["window"]["valid"], false);
}

#[test]
fn test_pointcloud_sparse_and_truncated() {
    let data = vec![0, 10, INVALID_DATA, 30, 40, 50];
    let frame = Frame::new(3, SystemTime::now(), data, 3, 2);

    let full = PointCloudReport::from_frame(&frame, &SentinelFilter, 100);
    assert_eq!(full.total_points, 4);
    assert!(!full.truncated);
    assert_eq!(full.data[0], CloudPoint { x: 1, y: 0, d: 10 });
    assert_eq!(full.data[1], CloudPoint { x: 0, y: 1, d: 30 });

    let capped = PointCloudReport::from_frame(&frame, &SentinelFilter, 2);
    assert_eq!(capped.data.len(), 2);
    assert!(capped.truncated);
    assert_eq!(capped.total_points, 4);
    assert_eq!(capped.width, 3);
    assert_eq!(capped.height, 2);
}

#[test]
fn test_connect_announcement() {
    let flags = FlagsSnapshot {
        active: false,
        pointcloud_requested: false,
        broker_connected: true,
        device_connected: false,
        power_save: true,
        connection_retries: 0,
    };
    let json = serde_json::to_string(&ConnectAnnouncement::new(flags)).unwrap();
    assert_eq!(
        json,
        r#"{"status":"connected","active":false,"device_connected":false,"power_save":true}"#
    );
}
