//! Machine health sampling and signalling: network probes, incident
//! classification, threshold alerts and adaptive polling.

pub mod alerts;
pub mod cache;
pub mod config;
pub mod environment;
pub mod history;
pub mod network;
pub mod polling;
pub mod probe;
pub mod runtime;
pub mod types;
