use crate::error::SensorError;
use crate::frame::Frame;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// Ask the acquisition loop, the link's only owner, for a fresh frame
#[derive(Debug)]
pub struct CaptureRequest {
    pub(super) reply: oneshot::Sender<Result<Frame, SensorError>>,
}

/// Cloneable sending side of the capture request channel
#[derive(Debug, Clone)]
pub struct CaptureRequester {
    tx: mpsc::Sender<CaptureRequest>,
}

/// Create the request channel; the receiver goes to the acquisition loop
pub fn capture_channel(capacity: usize) -> (CaptureRequester, mpsc::Receiver<CaptureRequest>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (CaptureRequester { tx }, rx)
}

impl CaptureRequester {
    /// Fresh capture, or an error once `wait` elapses or the loop is gone
    pub async fn request_frame(&self, wait: Duration) -> Result<Frame, SensorError> {
        let (reply, response) = oneshot::channel();

        let exchange = async {
            self.tx
                .send(CaptureRequest { reply })
                .await
                .map_err(|_| SensorError::NotConnected)?;
            response.await.map_err(|_| SensorError::NotConnected)?
        };

        timeout(wait, exchange)
            .await
            .map_err(|_| SensorError::CaptureTimeout { timeout: wait })?
    }
}
