use super::HpsService;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

impl HpsService {
    /// Cancel every loop and wait for them within the configured bound.
    /// Tasks still alive at the deadline are aborted. Returns 0 when every
    /// task stopped on its own.
    pub async fn shutdown(&mut self) -> i32 {
        info!("Beginning graceful shutdown");
        self.context.shutdown.cancel();

        let limit = self.context.config.system.shutdown_timeout();
        let deadline = Instant::now() + limit;
        let mut exit_code = 0;

        for (task, mut handle) in self.tasks.drain(..) {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => info!("{} task stopped", task.name()),
                Ok(Err(e)) => {
                    error!("{} task failed: {}", task.name(), e);
                    exit_code = 1;
                }
                Err(_) => {
                    warn!(
                        "{} task still running after {:?}, aborting",
                        task.name(),
                        limit
                    );
                    handle.abort();
                    exit_code = 1;
                }
            }
        }

        self.context.flags.set_device_connected(false);
        self.context.flags.set_broker_connected(false);
        self.http_addr = None;

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        exit_code
    }
}
