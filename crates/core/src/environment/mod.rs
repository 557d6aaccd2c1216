//! Host metric readers (Linux `/proc` and sysfs) and the monitors that run
//! them on the coordinator's schedule.

pub mod power;
pub mod sampler;
pub mod system;

pub use sampler::{BatterySampler, DiskSampler, MemorySampler, Sampler, SamplingMonitor};
pub use system::CpuSampler;
