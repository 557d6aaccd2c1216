//! Threshold alerts with cooldown, quiet hours and a global debounce, plus
//! network incident onset/recovery tracking.

mod engine;
mod rules;

pub use engine::{Alert, AlertRulesEngine, AlertRx, AlertTx, channel};
pub use rules::{AlertRule, is_quiet_hour};
