use super::request::CaptureRequest;
use crate::config::AcquisitionConfig;
use crate::error::SensorError;
use crate::frame::Frame;
use crate::recovery::{CapturePolicy, HealthCheck, ReconnectBackoff, RecoveryAction, RecoveryConfig};
use crate::sampler::PointSampler;
use crate::sensor::{ConnectionState, SensorEvent, SensorLink};
use crate::service::ServiceContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Background task refreshing the measurement store from the sensor.
///
/// Per cycle: idle while inactive, reconnect when the link is down or a
/// reconnect was signalled, then capture, sample and commit. Failed captures
/// are retried up to the configured bound before the link is torn down.
pub struct AcquisitionLoop {
    context: Arc<ServiceContext>,
    link: SensorLink,
    sampler: PointSampler,
    config: AcquisitionConfig,
    policy: CapturePolicy,
    backoff: ReconnectBackoff,
    health: HealthCheck,
    requests: mpsc::Receiver<CaptureRequest>,
    idle_cycles: u32,
}

impl AcquisitionLoop {
    pub fn new(
        context: Arc<ServiceContext>,
        mut link: SensorLink,
        requests: mpsc::Receiver<CaptureRequest>,
    ) -> Self {
        let config = context.config.acquisition.clone();
        let recovery = RecoveryConfig::from(&config);
        let sampler = PointSampler::new(context.config.sampling.min_valid_pixels);

        // The callback may run on a driver thread: it only raises a flag.
        let callback_context = Arc::clone(&context);
        link.register_event_handler(Arc::new(move |event| match event {
            SensorEvent::Disconnected => {
                warn!("Sensor reported disconnect, scheduling reconnect");
                callback_context.flags.signal_reconnect();
            }
            SensorEvent::SystemException { details } => {
                warn!(
                    "Sensor system exception: {}",
                    details.as_deref().unwrap_or("no details available")
                );
            }
        }));

        Self {
            context,
            link,
            sampler,
            policy: CapturePolicy::new(recovery.clone()),
            backoff: ReconnectBackoff::new(recovery),
            health: HealthCheck::new(config.health_check_cycles),
            config,
            requests,
            idle_cycles: 0,
        }
    }

    pub fn with_sampler(mut self, sampler: PointSampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// Run until the shutdown token is cancelled
    pub async fn run(mut self) {
        info!(
            "Acquisition loop started for {} points on {}",
            self.context.points.len(),
            self.link.port()
        );

        loop {
            let pause = self.cycle().await;
            if !self.pause(pause).await {
                break;
            }
        }

        self.link.teardown().await;
        self.context.flags.set_device_connected(false);
        info!("Acquisition loop stopped");
    }

    /// One pass of the state machine; returns how long to wait before the next
    async fn cycle(&mut self) -> Duration {
        if !self.context.flags.is_active() {
            self.enter_power_save().await;
            let idle = self.config.idle_interval(self.idle_cycles);
            self.idle_cycles = self.idle_cycles.saturating_add(1);
            return idle;
        }
        self.exit_power_save();

        if self.link.state() == ConnectionState::Disconnected
            || self.context.flags.reconnect_needed()
        {
            if let Err(delay) = self.reconnect().await {
                return delay;
            }
        }

        match self.link.capture_once().await {
            Ok(frame) => {
                self.commit(frame);
                if self.health.tick() && !self.link.is_connected() {
                    warn!("Health check found sensor link down");
                    self.context.flags.set_device_connected(false);
                    self.context.flags.signal_reconnect();
                }
                self.config.measure_interval()
            }
            Err(e) => self.recover(e).await,
        }
    }

    async fn recover(&mut self, error: SensorError) -> Duration {
        match self
            .policy
            .on_failure(self.link.consecutive_failures(), &error)
        {
            RecoveryAction::RetryAfterDelay(delay) => delay,
            RecoveryAction::RestartStream(pause) => {
                if let Err(e) = self.link.restart_stream(pause).await {
                    warn!("Stream restart failed: {}", e);
                }
                Duration::ZERO
            }
            RecoveryAction::Teardown => {
                self.link.teardown().await;
                self.context.flags.set_device_connected(false);
                Duration::ZERO
            }
        }
    }

    /// Open and start the link; on failure returns the backoff delay
    async fn reconnect(&mut self) -> Result<(), Duration> {
        let flags = &self.context.flags;
        // Cleared up front so a disconnect event raised mid-attempt is kept.
        flags.clear_reconnect();

        let result = match self.link.connect().await {
            Ok(()) => self.link.start_streaming().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.backoff.reset();
                flags.set_connection_retries(0);
                flags.set_device_connected(true);
                Ok(())
            }
            Err(e) => {
                if self.link.state() != ConnectionState::Disconnected {
                    self.link.teardown().await;
                }
                let delay = self.backoff.next_delay();
                flags.set_connection_retries(self.backoff.attempts());
                flags.set_device_connected(false);
                warn!(
                    "Sensor reconnect attempt {} failed: {}; retrying in {:?}",
                    self.backoff.attempts(),
                    e,
                    delay
                );
                Err(delay)
            }
        }
    }

    async fn enter_power_save(&mut self) {
        if self.context.flags.power_save() {
            return;
        }
        info!("Measurement inactive, entering power save mode");
        self.link.teardown().await;
        self.context.flags.set_device_connected(false);
        self.context.flags.set_power_save(true);
    }

    fn exit_power_save(&mut self) {
        self.idle_cycles = 0;
        if self.context.flags.power_save() {
            info!("Measurement active, leaving power save mode");
            self.context.flags.set_power_save(false);
        }
    }

    /// Sample outside the lock, then publish frame and measurements together
    fn commit(&mut self, frame: Frame) {
        let previous = self.context.store.measurements();
        let measurements = self
            .sampler
            .sample(&frame, &self.context.points, &previous);
        self.context.store.commit(frame, measurements);
    }

    async fn serve_capture(&mut self, request: CaptureRequest) {
        let result = if self.link.state() == ConnectionState::Streaming {
            self.link.capture_on_demand().await
        } else {
            Err(SensorError::NotConnected)
        };

        match &result {
            Ok(frame) => {
                debug!("Serving on-demand capture with frame {}", frame.id);
                self.commit(frame.clone());
            }
            Err(e) => debug!("On-demand capture failed: {}", e),
        }

        if request.reply.send(result).is_err() {
            debug!("Capture requester gave up before the reply");
        }
    }

    /// Sleep for `duration`, serving capture requests meanwhile. An inactive
    /// loop also wakes early when measurement is switched on. Returns false on
    /// shutdown.
    async fn pause(&mut self, duration: Duration) -> bool {
        let context = Arc::clone(&self.context);
        let idle = !context.flags.is_active();
        let timer = sleep(duration);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = context.shutdown.cancelled() => return false,
                _ = &mut timer => return true,
                _ = context.flags.activity_changed(), if idle => return true,
                Some(request) = self.requests.recv() => self.serve_capture(request).await,
            }
        }
    }
}
