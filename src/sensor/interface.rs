use crate::config::FilterSettings;
use crate::error::SensorError;
use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// Where the device is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorPort {
    /// Serial-over-USB device path such as `/dev/ttyACM0`
    Usb(String),
    /// Ethernet device addressed as `tcp://ip:port`
    Ethernet { ip: IpAddr, port: u16 },
}

impl FromStr for SensorPort {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |details: &str| SensorError::ConnectFailed {
            port: s.to_string(),
            details: details.to_string(),
        };

        if let Some(address) = s.strip_prefix("tcp://") {
            let (ip, port) = address
                .rsplit_once(':')
                .ok_or_else(|| invalid("expected tcp://ip:port"))?;
            let ip = ip
                .trim_matches(|c| c == '[' || c == ']')
                .parse()
                .map_err(|_| invalid("invalid IP address"))?;
            let port = port.parse().map_err(|_| invalid("invalid TCP port"))?;
            return Ok(SensorPort::Ethernet { ip, port });
        }

        if s.is_empty() {
            return Err(invalid("empty device path"));
        }

        Ok(SensorPort::Usb(s.to_string()))
    }
}

impl fmt::Display for SensorPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorPort::Usb(path) => write!(f, "{}", path),
            SensorPort::Ethernet { ip: IpAddr::V6(ip), port } => write!(f, "tcp://[{}]:{}", ip, port),
            SensorPort::Ethernet { ip, port } => write!(f, "tcp://{}:{}", ip, port),
        }
    }
}

/// Asynchronous notifications raised by the device driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorEvent {
    Disconnected,
    SystemException { details: Option<String> },
}

/// Callback invoked from the driver's notification context
pub type SensorEventHandler = Arc<dyn Fn(SensorEvent) + Send + Sync>;

/// Event tag reported alongside a single capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Full-resolution depth frame
    FullDepth,
    /// Any other packet type the device may emit
    Other(String),
}

/// Raw result of one device capture, before frame validation
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub event: CaptureEvent,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
}

/// Capability surface of the depth sensor driver.
///
/// Implementations are driven from a single task; `&mut self` on every
/// operation reflects that one owner holds the device handle.
#[async_trait]
pub trait DepthSensor: Send {
    /// Open the device on `port`
    async fn connect(&mut self, port: &SensorPort) -> Result<(), SensorError>;

    /// Close the device handle
    async fn disconnect(&mut self) -> Result<(), SensorError>;

    async fn start_streaming(&mut self) -> Result<(), SensorError>;

    async fn stop_streaming(&mut self) -> Result<(), SensorError>;

    /// One blocking acquisition
    async fn single_capture(&mut self) -> Result<RawCapture, SensorError>;

    /// Non-blocking connection query
    fn is_connected(&self) -> bool;

    fn device_version(&self) -> Option<String>;

    fn serial_number(&self) -> Option<String>;

    /// Pass-through filter configuration
    async fn apply_filters(&mut self, filters: &FilterSettings) -> Result<(), SensorError>;

    /// Install the disconnect/exception callback
    fn register_event_handler(&mut self, handler: SensorEventHandler);
}
