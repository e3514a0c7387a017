use super::point::{PointMeasurement, SamplePoint};
use crate::frame::{Frame, PixelFilter, SentinelFilter};
use std::sync::Arc;
use tracing::{debug, trace, Level};

/// Minimum valid pixels for a measurement to count (6 of a 5x5 window)
pub const DEFAULT_MIN_VALID_PIXELS: u32 = 6;

/// Aggregate over the valid pixels of one sampling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowStats {
    pub valid_pixels: u32,
    /// Pixels visited after clipping the window to the frame
    pub window_area: u32,
    pub sum: u64,
    pub min: Option<u16>,
    pub max: Option<u16>,
}

impl WindowStats {
    pub fn average(&self) -> Option<f64> {
        (self.valid_pixels > 0).then(|| self.sum as f64 / self.valid_pixels as f64)
    }

    fn accumulate(&mut self, raw: u16) {
        self.valid_pixels += 1;
        self.sum += raw as u64;
        self.min = Some(self.min.map_or(raw, |m| m.min(raw)));
        self.max = Some(self.max.map_or(raw, |m| m.max(raw)));
    }
}

/// Computes per-point window statistics from a full depth frame.
///
/// Sampling is pure: it reads only the frame, the points and the previous
/// measurements handed in, so it runs outside any shared lock.
#[derive(Clone)]
pub struct PointSampler {
    min_valid_pixels: u32,
    filter: Arc<dyn PixelFilter>,
}

impl PointSampler {
    pub fn new(min_valid_pixels: u32) -> Self {
        Self::with_filter(min_valid_pixels, Arc::new(SentinelFilter))
    }

    pub fn with_filter(min_valid_pixels: u32, filter: Arc<dyn PixelFilter>) -> Self {
        Self {
            min_valid_pixels,
            filter,
        }
    }

    pub fn min_valid_pixels(&self) -> u32 {
        self.min_valid_pixels
    }

    pub fn filter(&self) -> Arc<dyn PixelFilter> {
        Arc::clone(&self.filter)
    }

    /// Statistics for the window around `point`, clipped to the frame bounds
    pub fn window_stats(&self, frame: &Frame, point: &SamplePoint) -> WindowStats {
        let half = point.half_window() as i64;
        let (cx, cy) = (point.x as i64, point.y as i64);
        let mut stats = WindowStats::default();

        for y in (cy - half)..=(cy + half) {
            for x in (cx - half)..=(cx + half) {
                let Some(raw) = frame.pixel(x, y) else {
                    continue;
                };
                stats.window_area += 1;
                if self.filter.is_valid(raw) {
                    stats.accumulate(raw);
                }
            }
        }

        stats
    }

    /// Measure one point, carrying distances over from `previous` when the
    /// window does not reach the validity threshold
    pub fn measure(
        &self,
        frame: &Frame,
        point: &SamplePoint,
        previous: Option<&PointMeasurement>,
    ) -> PointMeasurement {
        let stats = self.window_stats(frame, point);
        let mut measurement = previous
            .cloned()
            .unwrap_or_else(|| PointMeasurement::unmeasured(point));

        measurement.name = point.name.clone();
        measurement.x = point.x;
        measurement.y = point.y;
        measurement.valid_pixels = stats.valid_pixels;
        measurement.frame_id = frame.id;
        measurement.valid = stats.valid_pixels >= self.min_valid_pixels;

        if tracing::enabled!(Level::TRACE) {
            trace!(
                "Point {} window: {}",
                point.name,
                format_window(frame, point)
            );
        }

        match (measurement.valid, stats.average()) {
            (true, Some(average)) => {
                measurement.distance_mm = average;
                measurement.min_distance_mm = stats.min.map_or(0.0, f64::from);
                measurement.max_distance_mm = stats.max.map_or(0.0, f64::from);
                measurement.updated_at = Some(frame.timestamp);
                debug!(
                    "Point {} valid: {}/{} pixels, avg {:.1} mm (min {:.1}, max {:.1})",
                    point.name,
                    stats.valid_pixels,
                    stats.window_area,
                    average,
                    measurement.min_distance_mm,
                    measurement.max_distance_mm
                );
            }
            _ => {
                // A zero threshold can mark an empty window valid; there is
                // nothing to average so the previous distances stay.
                debug!(
                    "Point {} invalid: {}/{} pixels (min {})",
                    point.name, stats.valid_pixels, stats.window_area, self.min_valid_pixels
                );
            }
        }

        measurement
    }

    /// Measure every point against `frame`
    pub fn sample(
        &self,
        frame: &Frame,
        points: &[SamplePoint],
        previous: &[PointMeasurement],
    ) -> Vec<PointMeasurement> {
        points
            .iter()
            .map(|point| {
                let prior = previous.iter().find(|m| m.name == point.name);
                self.measure(frame, point, prior)
            })
            .collect()
    }
}

impl std::fmt::Debug for PointSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointSampler")
            .field("min_valid_pixels", &self.min_valid_pixels)
            .finish_non_exhaustive()
    }
}

fn format_window(frame: &Frame, point: &SamplePoint) -> String {
    let half = point.half_window() as i64;
    let (cx, cy) = (point.x as i64, point.y as i64);
    let mut rows = Vec::with_capacity(point.window_size as usize);

    for y in (cy - half)..=(cy + half) {
        let row: Vec<String> = ((cx - half)..=(cx + half))
            .map(|x| {
                frame
                    .pixel(x, y)
                    .map_or_else(|| "    -".to_string(), |raw| format!("{:5}", raw))
            })
            .collect();
        rows.push(row.join(" "));
    }

    rows.join(" | ")
}
