pub mod acquisition;
pub mod config;
pub mod control;
pub mod error;
pub mod flags;
pub mod frame;
pub mod points;
pub mod publish;
pub mod recovery;
pub mod sampler;
pub mod sensor;
pub mod service;
pub mod store;

pub use acquisition::{capture_channel, AcquisitionLoop, CaptureRequester};
pub use config::ServiceConfig;
pub use control::ControlCommand;
pub use error::{PublishError, ResourceError, Result, SensorError, ServiceError};
pub use flags::{ControlFlags, FlagsSnapshot};
pub use frame::{Frame, PixelFilter, SentinelFilter, FRAME_HEIGHT, FRAME_WIDTH};
pub use points::{PointsFile, PointsOverrides, MAX_POINTS};
pub use publish::{MeasurementReport, OutputSink, PointCloudReport, PublishLoop};
pub use recovery::{CapturePolicy, ReconnectBackoff, RecoveryAction, RecoveryConfig};
pub use sampler::{PointMeasurement, PointSampler, SamplePoint};
pub use sensor::{DepthSensor, SensorLink, SensorLinkBuilder, SensorPort, SimulatedSensor};
pub use service::{HpsService, ServiceContext, ShutdownReason, StatusReport};
pub use store::{MeasurementStore, StoreSnapshot};
