//! Poll cadence control: profiles, the coordinator that applies them, and
//! the battery automation that flips power-save.

mod automation;
mod coordinator;
mod profile;

pub use automation::BatteryAutomation;
pub use coordinator::{Monitor, MonitorCoordinator};
pub use profile::{PollingProfile, scale_interval};
