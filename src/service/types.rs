/// Why the service is shutting down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

/// A spawned loop the service waits for on shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceTask {
    Acquisition,
    Publish,
    HttpControl,
    MqttControl,
}

impl ServiceTask {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceTask::Acquisition => "acquisition",
            ServiceTask::Publish => "publish",
            ServiceTask::HttpControl => "http",
            ServiceTask::MqttControl => "mqtt",
        }
    }
}
