use super::interface::{DepthSensor, SensorPort};
use super::link::SensorLink;
use super::simulated::SimulatedSensor;
use crate::config::SensorConfig;
use crate::error::{Result, ServiceError};

/// Builder for a sensor link
pub struct SensorLinkBuilder {
    config: Option<SensorConfig>,
    sensor: Option<Box<dyn DepthSensor>>,
}

impl SensorLinkBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            sensor: None,
        }
    }

    pub fn config(mut self, config: SensorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Drive a specific backend instead of the simulated device
    pub fn sensor(mut self, sensor: Box<dyn DepthSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn build(self) -> Result<SensorLink> {
        let config = self
            .config
            .ok_or_else(|| ServiceError::system("Sensor configuration must be specified"))?;
        let port: SensorPort = config.port.parse()?;

        let sensor = self
            .sensor
            .unwrap_or_else(|| Box::new(SimulatedSensor::new(config.simulation.clone())));

        Ok(SensorLink::new(sensor, port, &config))
    }
}

impl Default for SensorLinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
