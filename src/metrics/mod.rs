//! Metrics and monitoring for the appointment sweeper
//!
//! The collector is shared by the sweeper and the HTTP surface, which serves
//! the registry at `/metrics`.

pub mod collector;

pub use collector::{MetricsCollector, MetricsTimer, ServiceMetrics, SweepMetrics};
