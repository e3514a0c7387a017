use crate::config::ServiceConfig;
use crate::flags::{ControlFlags, FlagsSnapshot};
use crate::sampler::SamplePoint;
use crate::store::MeasurementStore;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State shared by every loop, handed out as `Arc<ServiceContext>`
#[derive(Debug)]
pub struct ServiceContext {
    pub config: ServiceConfig,
    /// Sample points, fixed for the process lifetime
    pub points: Vec<SamplePoint>,
    pub flags: ControlFlags,
    pub store: MeasurementStore,
    pub shutdown: CancellationToken,
}

/// Status reported by `GET /status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub active: bool,
    pub connected: bool,
    pub device_connected: bool,
    pub power_save: bool,
    pub retries: u32,
    pub broker_connected: bool,
}

impl From<FlagsSnapshot> for StatusReport {
    fn from(flags: FlagsSnapshot) -> Self {
        Self {
            active: flags.active,
            connected: flags.device_connected,
            device_connected: flags.device_connected,
            power_save: flags.power_save,
            retries: flags.connection_retries,
            broker_connected: flags.broker_connected,
        }
    }
}

impl ServiceContext {
    pub fn new(config: ServiceConfig, points: Vec<SamplePoint>) -> Arc<Self> {
        let flags = ControlFlags::new(config.acquisition.start_active);
        let store = MeasurementStore::new(&points);
        Arc::new(Self {
            config,
            points,
            flags,
            store,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn status(&self) -> StatusReport {
        self.flags.snapshot().into()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
