use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ServiceError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Errors the service keeps running through
    pub fn is_recoverable(&self) -> bool {
        match self {
            ServiceError::Sensor(_) | ServiceError::Publish(_) | ServiceError::Resource(_) => true,
            ServiceError::Io(_) | ServiceError::Json(_) => true,
            ServiceError::Config(_)
            | ServiceError::Serialization(_)
            | ServiceError::System { .. }
            | ServiceError::Component { .. } => false,
        }
    }
}

/// Failures talking to the depth sensor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("Failed to connect to sensor on {port}: {details}")]
    ConnectFailed { port: String, details: String },

    #[error("Sensor is not connected")]
    NotConnected,

    #[error("Failed to start streaming: {details}")]
    StreamStart { details: String },

    #[error("Capture failed: {details}")]
    CaptureFailed { details: String },

    #[error("Capture timed out after {timeout:?}")]
    CaptureTimeout { timeout: Duration },

    #[error("Unexpected capture event: {event}")]
    UnexpectedEvent { event: String },

    #[error("Sensor disconnected")]
    Disconnected,
}

impl SensorError {
    /// Connection-class errors need a link restart rather than a plain retry
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            SensorError::ConnectFailed { .. }
                | SensorError::NotConnected
                | SensorError::StreamStart { .. }
                | SensorError::Disconnected
        )
    }

    /// Hard read/write failures where the open device stream is suspect
    pub fn needs_stream_restart(&self) -> bool {
        matches!(self, SensorError::CaptureFailed { .. }) || self.is_connection_error()
    }
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Broker is not connected")]
    BrokerUnavailable,

    #[error("Publish to {topic} rejected: {details}")]
    Rejected { topic: String, details: String },

    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Output write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server failed: {details}")]
    ServerFailed { details: String },
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_error_classification() {
        assert!(SensorError::Disconnected.is_connection_error());
        assert!(SensorError::NotConnected.is_connection_error());
        assert!(!SensorError::CaptureTimeout {
            timeout: Duration::from_secs(1)
        }
        .is_connection_error());

        let read = SensorError::CaptureFailed {
            details: "read error".to_string(),
        };
        assert!(!read.is_connection_error());
        assert!(read.needs_stream_restart());
        assert!(!SensorError::CaptureTimeout {
            timeout: Duration::from_secs(1)
        }
        .needs_stream_restart());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(ServiceError::from(SensorError::Disconnected).is_recoverable());
        assert!(ServiceError::from(PublishError::BrokerUnavailable).is_recoverable());
        assert!(!ServiceError::system("boom").is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = ServiceError::component("http", "bind failed");
        assert_eq!(err.to_string(), "Component error in http: bind failed");

        let err = SensorError::ConnectFailed {
            port: "/dev/ttyACM0".to_string(),
            details: "no device".to_string(),
        };
        assert!(err.to_string().contains("/dev/ttyACM0"));
    }
}
