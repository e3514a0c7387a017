use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Notify;
use tracing::debug;

/// Independent atomic control and status flags shared by every loop.
///
/// Each flag has one writer role:
/// - `active`, `pointcloud_requested` (set): control surfaces
/// - `pointcloud_requested` (clear): publish loop
/// - `reconnect_needed` (set): sensor event callback, (clear): acquisition loop
/// - `device_connected`, `power_save`, `connection_retries`: acquisition loop
/// - `broker_connected`: MQTT event loop
#[derive(Debug, Default)]
pub struct ControlFlags {
    active: AtomicBool,
    pointcloud_requested: AtomicBool,
    broker_connected: AtomicBool,
    reconnect_needed: AtomicBool,
    device_connected: AtomicBool,
    power_save: AtomicBool,
    connection_retries: AtomicU32,
    activity: Notify,
}

/// Point-in-time view of the flags, for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagsSnapshot {
    pub active: bool,
    pub pointcloud_requested: bool,
    pub broker_connected: bool,
    pub device_connected: bool,
    pub power_save: bool,
    pub connection_retries: u32,
}

impl ControlFlags {
    pub fn new(start_active: bool) -> Self {
        let flags = Self::default();
        flags.active.store(start_active, Ordering::SeqCst);
        flags
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        let previous = self.active.swap(active, Ordering::SeqCst);
        if previous != active {
            debug!("Measurement {}", if active { "activated" } else { "deactivated" });
            self.activity.notify_one();
        }
    }

    /// Resolves after the next change of `active` (or immediately if one
    /// happened since the last wait)
    pub async fn activity_changed(&self) {
        self.activity.notified().await;
    }

    pub fn pointcloud_requested(&self) -> bool {
        self.pointcloud_requested.load(Ordering::SeqCst)
    }

    pub fn request_pointcloud(&self) {
        self.pointcloud_requested.store(true, Ordering::SeqCst);
    }

    pub fn clear_pointcloud_request(&self) {
        self.pointcloud_requested.store(false, Ordering::SeqCst);
    }

    pub fn broker_connected(&self) -> bool {
        self.broker_connected.load(Ordering::SeqCst)
    }

    pub fn set_broker_connected(&self, connected: bool) {
        self.broker_connected.store(connected, Ordering::SeqCst);
    }

    pub fn reconnect_needed(&self) -> bool {
        self.reconnect_needed.load(Ordering::SeqCst)
    }

    /// Signal from the sensor event callback; the acquisition loop does the work
    pub fn signal_reconnect(&self) {
        self.reconnect_needed.store(true, Ordering::SeqCst);
    }

    pub fn clear_reconnect(&self) {
        self.reconnect_needed.store(false, Ordering::SeqCst);
    }

    pub fn device_connected(&self) -> bool {
        self.device_connected.load(Ordering::SeqCst)
    }

    pub fn set_device_connected(&self, connected: bool) {
        self.device_connected.store(connected, Ordering::SeqCst);
    }

    pub fn power_save(&self) -> bool {
        self.power_save.load(Ordering::SeqCst)
    }

    pub fn set_power_save(&self, enabled: bool) {
        self.power_save.store(enabled, Ordering::SeqCst);
    }

    pub fn connection_retries(&self) -> u32 {
        self.connection_retries.load(Ordering::SeqCst)
    }

    pub fn set_connection_retries(&self, retries: u32) {
        self.connection_retries.store(retries, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> FlagsSnapshot {
        FlagsSnapshot {
            active: self.is_active(),
            pointcloud_requested: self.pointcloud_requested(),
            broker_connected: self.broker_connected(),
            device_connected: self.device_connected(),
            power_save: self.power_save(),
            connection_retries: self.connection_retries(),
        }
    }
}
