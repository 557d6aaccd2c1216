mod service;
mod shutdown;

pub use service::{ConfigHandle, Runtime};
pub use shutdown::ShutdownGuard;
