mod json;
mod publisher;
mod sink;
#[cfg(test)]
mod tests;

pub use json::{
    CloudPoint, ConnectAnnouncement, Coordinates, MeasurementReport, PointCloudReport, PointReport,
};
pub use publisher::PublishLoop;
#[cfg(feature = "mqtt")]
pub use sink::MqttSink;
pub use sink::{Channel, MemorySink, OutputSink, StdoutSink};
