use crate::flags::FlagsSnapshot;
use crate::frame::{Frame, PixelFilter};
use crate::sampler::PointMeasurement;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Measurement payload published every output interval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementReport {
    pub timestamp: u64,
    pub active: bool,
    pub device_connected: bool,
    pub power_save_mode: bool,
    pub connection_retries: u32,
    pub measurements: BTreeMap<String, PointReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointReport {
    pub distance_mm: f64,
    pub distance_m: f64,
    pub min_distance_mm: f64,
    pub max_distance_mm: f64,
    pub valid_pixels: u32,
    pub valid: bool,
    /// Seconds since the last valid reading, null if there never was one
    pub age_seconds: Option<u64>,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Coordinates {
    pub x: u32,
    pub y: u32,
}

/// Sparse point cloud: valid pixels only, row-major
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointCloudReport {
    pub timestamp: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<CloudPoint>,
    /// Set when `data` was cut at the configured point cap
    pub truncated: bool,
    /// Valid pixels in the frame, including any cut off
    pub total_points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CloudPoint {
    pub x: u32,
    pub y: u32,
    pub d: u16,
}

/// Payload announced on `<measurement_topic>/status` after a broker connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectAnnouncement {
    pub status: &'static str,
    pub active: bool,
    pub device_connected: bool,
    pub power_save: bool,
}

fn unix_seconds(at: SystemTime) -> u64 {
    at.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

impl MeasurementReport {
    pub fn build(measurements: &[PointMeasurement], flags: FlagsSnapshot, now: SystemTime) -> Self {
        let measurements = measurements
            .iter()
            .map(|m| (m.name.clone(), PointReport::from_measurement(m, now)))
            .collect();

        Self {
            timestamp: unix_seconds(now),
            active: flags.active,
            device_connected: flags.device_connected,
            power_save_mode: flags.power_save,
            connection_retries: flags.connection_retries,
            measurements,
        }
    }
}

impl PointReport {
    pub fn from_measurement(m: &PointMeasurement, now: SystemTime) -> Self {
        Self {
            distance_mm: round_to(m.distance_mm, 1),
            distance_m: round_to(m.distance_m(), 3),
            min_distance_mm: round_to(m.min_distance_mm, 1),
            max_distance_mm: round_to(m.max_distance_mm, 1),
            valid_pixels: m.valid_pixels,
            valid: m.valid,
            age_seconds: m.age_seconds(now),
            coordinates: Coordinates { x: m.x, y: m.y },
        }
    }
}

impl PointCloudReport {
    /// Render the valid pixels of `frame`, keeping at most `max_points`
    pub fn from_frame(frame: &Frame, filter: &dyn PixelFilter, max_points: usize) -> Self {
        let mut data = Vec::new();
        let mut total_points = 0usize;

        for (x, y, d) in frame.valid_pixels(filter) {
            total_points += 1;
            if data.len() < max_points {
                data.push(CloudPoint { x, y, d });
            }
        }

        Self {
            timestamp: frame.unix_timestamp(),
            width: frame.width,
            height: frame.height,
            truncated: total_points > data.len(),
            total_points,
            data,
        }
    }
}

impl ConnectAnnouncement {
    pub fn new(flags: FlagsSnapshot) -> Self {
        Self {
            status: "connected",
            active: flags.active,
            device_connected: flags.device_connected,
            power_save: flags.power_save,
        }
    }
}
