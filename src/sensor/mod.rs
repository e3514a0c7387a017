mod builder;
mod interface;
mod link;
pub mod mock;
mod simulated;
#[cfg(test)]
mod tests;

pub use crate::config::{FilterSettings, SmoothFilter};
pub use builder::SensorLinkBuilder;
pub use interface::{
    CaptureEvent, DepthSensor, RawCapture, SensorEvent, SensorEventHandler, SensorPort,
};
pub use link::{ConnectionState, SensorLink};
pub use mock::{MockCapture, MockSensor, MockSensorHandle};
pub use simulated::SimulatedSensor;
