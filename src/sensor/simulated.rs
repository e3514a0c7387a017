use super::interface::{
    CaptureEvent, DepthSensor, RawCapture, SensorEvent, SensorEventHandler, SensorPort,
};
use crate::config::{FilterSettings, SimulationConfig};
use crate::error::SensorError;
use crate::frame::{FRAME_HEIGHT, FRAME_WIDTH, LOW_AMPLITUDE, SENTINEL_LOW};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Stand-in for the vendor driver producing synthetic 160x60 frames:
/// a tilted plane with low-amplitude speckles and optional periodic
/// read failures.
pub struct SimulatedSensor {
    config: SimulationConfig,
    port: Option<SensorPort>,
    streaming: bool,
    captures: u64,
    handler: Option<SensorEventHandler>,
}

impl SimulatedSensor {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            port: None,
            streaming: false,
            captures: 0,
            handler: None,
        }
    }

    fn render(&self) -> Vec<u16> {
        let center = (FRAME_WIDTH / 2) as i64;
        let base = self.config.base_distance_mm as i64;
        let tilt = self.config.tilt_mm_per_column as i64;
        let speckle = self.config.speckle_every as u64;
        let phase = if speckle > 0 { self.captures % speckle } else { 0 };

        (0..FRAME_HEIGHT)
            .flat_map(|y| (0..FRAME_WIDTH).map(move |x| (x, y)))
            .enumerate()
            .map(|(index, (x, _y))| {
                if speckle > 0 && index as u64 % speckle == phase {
                    return LOW_AMPLITUDE;
                }
                let distance = base + (x as i64 - center) * tilt;
                distance.clamp(1, SENTINEL_LOW as i64 - 1) as u16
            })
            .collect()
    }

    fn notify(&self, event: SensorEvent) {
        if let Some(handler) = &self.handler {
            handler(event);
        }
    }
}

#[async_trait]
impl DepthSensor for SimulatedSensor {
    async fn connect(&mut self, port: &SensorPort) -> Result<(), SensorError> {
        info!("Simulated sensor attached on {}", port);
        self.port = Some(port.clone());
        self.streaming = false;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SensorError> {
        if self.port.take().is_some() {
            debug!("Simulated sensor closed");
        }
        self.streaming = false;
        Ok(())
    }

    async fn start_streaming(&mut self) -> Result<(), SensorError> {
        if self.port.is_none() {
            return Err(SensorError::NotConnected);
        }
        self.streaming = true;
        Ok(())
    }

    async fn stop_streaming(&mut self) -> Result<(), SensorError> {
        self.streaming = false;
        Ok(())
    }

    async fn single_capture(&mut self) -> Result<RawCapture, SensorError> {
        if self.port.is_none() {
            return Err(SensorError::NotConnected);
        }

        tokio::time::sleep(Duration::from_millis(self.config.capture_latency_ms)).await;
        self.captures += 1;

        let fail_every = self.config.fail_every as u64;
        if fail_every > 0 && self.captures % fail_every == 0 {
            warn!("Simulated read failure on capture {}", self.captures);
            self.notify(SensorEvent::SystemException {
                details: Some("simulated read error".to_string()),
            });
            return Err(SensorError::CaptureFailed {
                details: "simulated read error".to_string(),
            });
        }

        Ok(RawCapture {
            event: CaptureEvent::FullDepth,
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            data: self.render(),
        })
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn device_version(&self) -> Option<String> {
        self.port.as_ref().map(|_| "HPS3D160 simulated 1.8".to_string())
    }

    fn serial_number(&self) -> Option<String> {
        self.port.as_ref().map(|_| "SIM-00000001".to_string())
    }

    async fn apply_filters(&mut self, filters: &FilterSettings) -> Result<(), SensorError> {
        debug!("Simulated sensor ignoring filter settings: {:?}", filters);
        Ok(())
    }

    fn register_event_handler(&mut self, handler: SensorEventHandler) {
        self.handler = Some(handler);
    }
}
