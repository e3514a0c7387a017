use super::{HpsService, ShutdownHandle, ShutdownReason};
use crate::error::{Result, ServiceError};
use tokio::signal;
use tracing::{error, info};

impl HpsService {
    /// Start every loop, wait for SIGINT/SIGTERM or a shutdown request, then
    /// stop. Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        self.start().await?;
        self.setup_signal_handlers();
        info!("HPS3D service is running");

        let reason = self.wait_for_shutdown().await?;
        info!("Shutdown initiated: {:?}", reason);

        let exit_code = self.shutdown().await;
        info!("HPS3D service shutdown complete");
        Ok(exit_code)
    }

    /// Resolves on the first shutdown request
    pub async fn wait_for_shutdown(&mut self) -> Result<ShutdownReason> {
        let mut receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| ServiceError::system("Shutdown receiver already taken"))?;

        receiver
            .recv()
            .await
            .ok_or_else(|| ServiceError::system("Shutdown channel closed unexpectedly"))
    }

    fn setup_signal_handlers(&self) {
        #[cfg(unix)]
        {
            let handle = self.shutdown_handle();
            tokio::spawn(async move {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            handle.request(ShutdownReason::Signal("SIGTERM".to_string()));
                        }
                    }
                    Err(e) => error!("Failed to register SIGTERM handler: {}", e),
                }
            });
        }

        let handle: ShutdownHandle = self.shutdown_handle();
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                handle.request(ShutdownReason::Signal("SIGINT".to_string()));
            }
        });
    }
}
