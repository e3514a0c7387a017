use crate::config::ServiceConfig;
use crate::error::Result;
use crate::frame::{FRAME_HEIGHT, FRAME_WIDTH};
use crate::sampler::SamplePoint;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

/// Upper bound on configured sample points
pub const MAX_POINTS: usize = 16;

/// Service settings a points file may override
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointsOverrides {
    pub debug: Option<bool>,
    pub debug_file: Option<String>,
    pub min_valid_pixels: Option<u32>,
    pub mqtt_port: Option<u16>,
    pub threading: Option<bool>,
}

/// Parsed points file: sample points plus `key=value` overrides
#[derive(Debug, Clone, PartialEq)]
pub struct PointsFile {
    pub points: Vec<SamplePoint>,
    pub overrides: PointsOverrides,
}

/// Points used when no points file is present
pub fn default_points(window_size: u32) -> Vec<SamplePoint> {
    [
        ("point_1", 40, 30),
        ("point_2", 120, 30),
        ("point_3", 40, 45),
        ("point_4", 120, 45),
    ]
    .into_iter()
    .map(|(name, x, y)| SamplePoint::new(name, x, y).with_window_size(window_size))
    .collect()
}

impl PointsFile {
    /// Read a points file; a missing file yields the default points
    pub fn load<P: AsRef<Path>>(path: P, window_size: u32) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let parsed = Self::parse(&text, window_size);
                info!(
                    "Loaded {} sample points from {}",
                    parsed.points.len(),
                    path.display()
                );
                Ok(parsed)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "Points file {} not found, using default points",
                    path.display()
                );
                Ok(Self {
                    points: default_points(window_size),
                    overrides: PointsOverrides::default(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse points file text. Bad lines are skipped with a warning.
    pub fn parse(text: &str, window_size: u32) -> Self {
        let mut points: Vec<SamplePoint> = Vec::new();
        let mut names = HashSet::new();
        let mut overrides = PointsOverrides::default();

        for (index, raw_line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                apply_setting(&mut overrides, key.trim(), value.trim(), line_no, window_size);
                continue;
            }

            let Some(point) = parse_point(line, window_size) else {
                warn!("Points file line {}: malformed entry '{}'", line_no, line);
                continue;
            };

            if !point.window_fits(FRAME_WIDTH, FRAME_HEIGHT) {
                warn!(
                    "Points file line {}: ({},{}) rejected, {}x{} window leaves the {}x{} frame",
                    line_no,
                    point.x,
                    point.y,
                    point.window_size,
                    point.window_size,
                    FRAME_WIDTH,
                    FRAME_HEIGHT
                );
                continue;
            }

            if points.len() >= MAX_POINTS {
                warn!(
                    "Points file line {}: '{}' ignored, at most {} points supported",
                    line_no, point.name, MAX_POINTS
                );
                continue;
            }

            if !names.insert(point.name.clone()) {
                warn!(
                    "Points file line {}: duplicate point name '{}'",
                    line_no, point.name
                );
                continue;
            }

            debug!("Sample point {} at ({},{})", point.name, point.x, point.y);
            points.push(point);
        }

        if points.is_empty() {
            warn!("Points file defines no usable points, using default points");
            points = default_points(window_size);
        }

        Self { points, overrides }
    }

    /// Apply the file's overrides on top of the service configuration
    pub fn apply_overrides(&self, config: &mut ServiceConfig) {
        let o = &self.overrides;
        if let Some(debug) = o.debug {
            config.logging.debug = debug;
        }
        if let Some(path) = &o.debug_file {
            config.logging.debug_file = Some(path.clone());
        }
        if let Some(min) = o.min_valid_pixels {
            config.sampling.min_valid_pixels = min;
        }
        if let Some(port) = o.mqtt_port {
            config.mqtt.port = port;
        }
        if let Some(threading) = o.threading {
            config.system.use_threading = threading;
        }
    }
}

fn apply_setting(
    overrides: &mut PointsOverrides,
    key: &str,
    value: &str,
    line_no: usize,
    window_size: u32,
) {
    let window_area = window_size.saturating_mul(window_size);
    let applied = match key {
        "debug" => parse_flag(value).map(|v| overrides.debug = Some(v)),
        "debug_file" if !value.is_empty() => {
            overrides.debug_file = Some(value.to_string());
            Some(())
        }
        "debug_file" => Some(()),
        "min_valid_pixels" => value
            .parse::<u32>()
            .ok()
            .filter(|v| (1..=window_area).contains(v))
            .map(|v| overrides.min_valid_pixels = Some(v)),
        "mqtt_port" => value.parse().ok().map(|v| overrides.mqtt_port = Some(v)),
        "threading" => parse_flag(value).map(|v| overrides.threading = Some(v)),
        _ => {
            warn!("Points file line {}: unknown setting '{}'", line_no, key);
            return;
        }
    };

    if applied.is_none() {
        warn!(
            "Points file line {}: invalid value '{}' for {}",
            line_no, value, key
        );
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_point(line: &str, window_size: u32) -> Option<SamplePoint> {
    let mut parts = line.splitn(3, ',');
    let x = parts.next()?.trim().parse().ok()?;
    let y = parts.next()?.trim().parse().ok()?;
    let name = parts.next()?.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some(SamplePoint::new(name, x, y).with_window_size(window_size))
}
