mod command;
#[cfg(feature = "http")]
mod http;
#[cfg(feature = "mqtt")]
mod mqtt;
#[cfg(test)]
mod tests;

pub use command::ControlCommand;
#[cfg(feature = "http")]
pub use http::{control_router, BoundControlServer, ControlServer};
#[cfg(feature = "mqtt")]
pub use mqtt::{mqtt_options, MqttControl};
