mod point;
mod window;

pub use point::{PointMeasurement, SamplePoint, DEFAULT_WINDOW_SIZE};
pub use window::{PointSampler, WindowStats, DEFAULT_MIN_VALID_PIXELS};
