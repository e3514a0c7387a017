mod request;
mod worker;

pub use request::{capture_channel, CaptureRequest, CaptureRequester};
pub use worker::AcquisitionLoop;
