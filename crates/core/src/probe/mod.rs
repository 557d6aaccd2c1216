//! Best-effort TCP latency probe.
//!
//! One probe keeps reconnecting to a single `(host, port)` target, sends a
//! single byte per connection and derives ping, jitter and packet loss from
//! a bounded window of recent samples.

mod engine;
mod window;

pub use engine::{PingEngine, ProbeError, ProbeReader, ProbeState, ProbeTarget, RECONNECT_DELAY};
pub use window::{MAX_SAMPLES, PingSample, SampleWindow};
