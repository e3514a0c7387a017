use crate::flags::ControlFlags;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Commands accepted by both control surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    GetPointcloud,
}

impl FromStr for ControlCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(ControlCommand::Start),
            "stop" => Ok(ControlCommand::Stop),
            "get_pointcloud" => Ok(ControlCommand::GetPointcloud),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlCommand::Start => "start",
            ControlCommand::Stop => "stop",
            ControlCommand::GetPointcloud => "get_pointcloud",
        };
        f.write_str(name)
    }
}

impl ControlCommand {
    /// Parse a plain-text MQTT payload
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        std::str::from_utf8(payload).ok()?.parse().ok()
    }

    /// Flip the matching flag. Control surfaces never touch the sensor or the
    /// store; the loops pick the change up on their next cycle.
    pub fn apply(self, flags: &ControlFlags, source: &str) {
        info!("Control command '{}' via {}", self, source);
        match self {
            ControlCommand::Start => flags.set_active(true),
            ControlCommand::Stop => flags.set_active(false),
            ControlCommand::GetPointcloud => flags.request_pointcloud(),
        }
    }
}
