use super::interface::{CaptureEvent, DepthSensor, SensorEventHandler, SensorPort};
use crate::config::{FilterSettings, SensorConfig};
use crate::error::SensorError;
use crate::frame::Frame;
use std::fmt;
use std::time::{Duration, SystemTime};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Streaming,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// Owns the device handle and its connection state.
///
/// Only the acquisition loop holds a `SensorLink`. The driver callback never
/// reaches it; it only raises a flag the loop polls.
pub struct SensorLink {
    sensor: Box<dyn DepthSensor>,
    port: SensorPort,
    state: ConnectionState,
    consecutive_failures: u32,
    next_frame_id: u64,
    capture_timeout: Duration,
    settle_delay: Duration,
    filters: FilterSettings,
}

impl SensorLink {
    pub fn new(sensor: Box<dyn DepthSensor>, port: SensorPort, config: &SensorConfig) -> Self {
        Self {
            sensor,
            port,
            state: ConnectionState::Disconnected,
            consecutive_failures: 0,
            next_frame_id: 1,
            capture_timeout: config.capture_timeout(),
            settle_delay: config.settle_delay().max(Duration::from_millis(100)),
            filters: config.filters.clone(),
        }
    }

    pub fn register_event_handler(&mut self, handler: SensorEventHandler) {
        self.sensor.register_event_handler(handler);
    }

    /// Open the link. An already open link is closed and reopened after the
    /// settle delay to clear stuck device state.
    pub async fn connect(&mut self) -> Result<(), SensorError> {
        if self.state != ConnectionState::Disconnected || self.sensor.is_connected() {
            debug!("Sensor link already open, reopening");
            self.close().await;
            sleep(self.settle_delay).await;
        }

        info!("Connecting to sensor on {}", self.port);
        if let Err(e) = self.sensor.connect(&self.port).await {
            self.state = ConnectionState::Disconnected;
            return Err(e);
        }

        self.state = ConnectionState::Connected;
        self.consecutive_failures = 0;

        info!(
            "Sensor connected: version {}, serial {}",
            self.sensor.device_version().as_deref().unwrap_or("unknown"),
            self.sensor.serial_number().as_deref().unwrap_or("unknown")
        );

        if let Err(e) = self.sensor.apply_filters(&self.filters).await {
            warn!("Failed to apply sensor filter settings: {}", e);
        }

        Ok(())
    }

    /// Connected -> Streaming; the state stays Connected when the device refuses
    pub async fn start_streaming(&mut self) -> Result<(), SensorError> {
        match self.state {
            ConnectionState::Disconnected => Err(SensorError::NotConnected),
            ConnectionState::Streaming => Ok(()),
            ConnectionState::Connected => {
                self.sensor.start_streaming().await?;
                self.state = ConnectionState::Streaming;
                debug!("Sensor streaming started");
                Ok(())
            }
        }
    }

    /// Streaming -> Connected
    pub async fn stop_streaming(&mut self) -> Result<(), SensorError> {
        match self.state {
            ConnectionState::Disconnected => Err(SensorError::NotConnected),
            ConnectionState::Connected => Ok(()),
            ConnectionState::Streaming => {
                self.sensor.stop_streaming().await?;
                self.state = ConnectionState::Connected;
                debug!("Sensor streaming stopped");
                Ok(())
            }
        }
    }

    /// Stop, pause, start
    pub async fn restart_stream(&mut self, pause: Duration) -> Result<(), SensorError> {
        if let Err(e) = self.stop_streaming().await {
            debug!("Ignoring stop failure during stream restart: {}", e);
        }
        sleep(pause).await;
        self.start_streaming().await
    }

    /// One acquisition, bounded by the capture timeout. Updates the
    /// consecutive failure counter.
    pub async fn capture_once(&mut self) -> Result<Frame, SensorError> {
        let result = self.capture_inner().await;
        match &result {
            Ok(frame) => {
                self.consecutive_failures = 0;
                debug!("Captured frame {}", frame.id);
            }
            Err(_) => {
                self.consecutive_failures += 1;
            }
        }
        result
    }

    /// Capture outside the measurement cycle. Failures here leave the
    /// consecutive failure counter alone.
    pub async fn capture_on_demand(&mut self) -> Result<Frame, SensorError> {
        self.capture_inner().await
    }

    async fn capture_inner(&mut self) -> Result<Frame, SensorError> {
        if self.state == ConnectionState::Disconnected {
            return Err(SensorError::NotConnected);
        }

        let raw = timeout(self.capture_timeout, self.sensor.single_capture())
            .await
            .map_err(|_| SensorError::CaptureTimeout {
                timeout: self.capture_timeout,
            })??;

        if raw.event != CaptureEvent::FullDepth {
            return Err(SensorError::UnexpectedEvent {
                event: format!("{:?}", raw.event),
            });
        }

        let frame = Frame::new(
            self.next_frame_id,
            SystemTime::now(),
            raw.data,
            raw.width,
            raw.height,
        );
        if !frame.validate_size() {
            return Err(SensorError::CaptureFailed {
                details: format!(
                    "frame buffer holds {} samples, expected {}x{}",
                    frame.data.len(),
                    frame.width,
                    frame.height
                ),
            });
        }

        self.next_frame_id += 1;
        Ok(frame)
    }

    /// Stop and close; errors are logged, the state always ends Disconnected
    pub async fn teardown(&mut self) {
        if self.state == ConnectionState::Disconnected && !self.sensor.is_connected() {
            return;
        }
        info!("Tearing down sensor link on {}", self.port);
        self.close().await;
    }

    async fn close(&mut self) {
        if self.state == ConnectionState::Streaming {
            if let Err(e) = self.sensor.stop_streaming().await {
                warn!("Failed to stop sensor streaming: {}", e);
            }
        }
        if let Err(e) = self.sensor.disconnect().await {
            warn!("Failed to close sensor: {}", e);
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Non-blocking: the link believes it is open and the driver agrees
    pub fn is_connected(&self) -> bool {
        self.state != ConnectionState::Disconnected && self.sensor.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn port(&self) -> &SensorPort {
        &self.port
    }
}

impl fmt::Debug for SensorLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorLink")
            .field("port", &self.port)
            .field("state", &self.state)
            .field("consecutive_failures", &self.consecutive_failures)
            .finish_non_exhaustive()
    }
}
