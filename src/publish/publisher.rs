use super::json::{MeasurementReport, PointCloudReport};
use super::sink::{Channel, OutputSink};
use crate::acquisition::CaptureRequester;
use crate::error::PublishError;
use crate::frame::{PixelFilter, SentinelFilter};
use crate::service::ServiceContext;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Periodically renders the store to JSON and hands it to every sink
pub struct PublishLoop {
    context: Arc<ServiceContext>,
    sinks: Vec<Arc<dyn OutputSink>>,
    capture: CaptureRequester,
    filter: Arc<dyn PixelFilter>,
}

impl PublishLoop {
    pub fn new(context: Arc<ServiceContext>, capture: CaptureRequester) -> Self {
        Self {
            context,
            sinks: Vec::new(),
            capture,
            filter: Arc::new(SentinelFilter),
        }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn OutputSink>) {
        info!("Registered {} output sink", sink.name());
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.add_sink(sink);
        self
    }

    /// Use the same validity predicate as the sampler
    pub fn with_filter(mut self, filter: Arc<dyn PixelFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub async fn run(self) {
        let mut ticker = interval(self.context.config.output.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Publish loop started ({} sinks, every {:?})",
            self.sinks.len(),
            self.context.config.output.interval()
        );

        loop {
            tokio::select! {
                _ = self.context.shutdown.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        info!("Publish loop stopped");
    }

    /// One publish interval
    pub async fn tick(&self) {
        if self.context.flags.is_active() {
            self.publish_measurements().await;
        }

        if self.context.flags.pointcloud_requested() {
            self.publish_pointcloud().await;
            // Cleared whatever happened so an unserviceable request cannot wedge the loop
            self.context.flags.clear_pointcloud_request();
        }
    }

    async fn publish_measurements(&self) {
        let snapshot = self.context.store.snapshot();
        let report = MeasurementReport::build(
            &snapshot.measurements,
            self.context.flags.snapshot(),
            SystemTime::now(),
        );

        match serde_json::to_string(&report) {
            Ok(payload) => self.fan_out(Channel::Measurements, &payload).await,
            Err(e) => warn!("Failed to render measurement JSON: {}", e),
        }
    }

    async fn publish_pointcloud(&self) {
        info!("Point cloud requested, capturing fresh frame");
        let output = &self.context.config.output;

        let frame = match self.capture.request_frame(output.pointcloud_timeout()).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Point cloud capture failed: {}", e);
                return;
            }
        };

        let report =
            PointCloudReport::from_frame(&frame, self.filter.as_ref(), output.max_pointcloud_points);
        if report.truncated {
            warn!(
                "Point cloud truncated to {} of {} points",
                report.data.len(),
                report.total_points
            );
        }

        match serde_json::to_string(&report) {
            Ok(payload) => {
                debug!(
                    "Publishing point cloud of frame {} ({} bytes)",
                    frame.id,
                    payload.len()
                );
                self.fan_out(Channel::PointCloud, &payload).await;
            }
            Err(e) => warn!("Failed to render point cloud JSON: {}", e),
        }
    }

    async fn fan_out(&self, channel: Channel, payload: &str) {
        for sink in &self.sinks {
            match sink.publish(channel, payload).await {
                Ok(()) => {}
                Err(PublishError::BrokerUnavailable) => {
                    debug!("Skipping {} publish, broker not connected", sink.name());
                }
                Err(e) => warn!("Publish to {} failed: {}", sink.name(), e),
            }
        }
    }
}
