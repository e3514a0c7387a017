mod context;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod types;


pub use context::{ServiceContext, StatusReport};
pub use orchestrator::{HpsService, ShutdownHandle};
pub use types::{ServiceTask, ShutdownReason};
