//! Network health: snapshot production and incident classification.

pub mod health;
pub mod incident;

pub use health::{LinkAttributes, LinkReader, NetworkHealthMonitor, NoRadio, StaticLink};
pub use incident::detect;
