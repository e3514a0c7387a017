use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Side length of the square sampling window
pub const DEFAULT_WINDOW_SIZE: u32 = 5;

/// A configured pixel coordinate whose surrounding window is tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Unique point name, used as the key in published measurements
    pub name: String,
    pub x: u32,
    pub y: u32,
    /// Odd window side length centered on (x, y)
    pub window_size: u32,
}

impl SamplePoint {
    pub fn new<S: Into<String>>(name: S, x: u32, y: u32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }

    pub fn with_window_size(mut self, window_size: u32) -> Self {
        self.window_size = window_size;
        self
    }

    /// Distance from the center to the window edge
    pub fn half_window(&self) -> u32 {
        self.window_size / 2
    }

    pub fn window_area(&self) -> u32 {
        self.window_size * self.window_size
    }

    /// Whether the full window lies inside a `width` x `height` frame
    pub fn window_fits(&self, width: u32, height: u32) -> bool {
        let half = self.half_window();
        self.x >= half
            && self.y >= half
            && self.x + half < width
            && self.y + half < height
    }
}

/// Latest aggregate reading for one sample point
#[derive(Debug, Clone, PartialEq)]
pub struct PointMeasurement {
    pub name: String,
    pub x: u32,
    pub y: u32,
    /// Average distance in millimeters (last valid value when `valid` is false)
    pub distance_mm: f64,
    pub min_distance_mm: f64,
    pub max_distance_mm: f64,
    /// Valid pixels in the most recent window, never above the window area
    pub valid_pixels: u32,
    pub valid: bool,
    /// Time of the last valid measurement, `None` until the first one
    pub updated_at: Option<SystemTime>,
    /// Frame the counts were computed from
    pub frame_id: u64,
}

impl PointMeasurement {
    /// Placeholder for a point that has not been measured yet
    pub fn unmeasured(point: &SamplePoint) -> Self {
        Self {
            name: point.name.clone(),
            x: point.x,
            y: point.y,
            distance_mm: 0.0,
            min_distance_mm: 0.0,
            max_distance_mm: 0.0,
            valid_pixels: 0,
            valid: false,
            updated_at: None,
            frame_id: 0,
        }
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_mm / 1000.0
    }

    /// Whole seconds since the last valid measurement
    pub fn age_seconds(&self, now: SystemTime) -> Option<u64> {
        self.updated_at
            .map(|at| now.duration_since(at).unwrap_or_default().as_secs())
    }
}
