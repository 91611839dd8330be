//! Destination implementations.

pub mod telemetry_metrics;

pub use self::telemetry_metrics::{TelemetryMetrics, TelemetryMetricsConfiguration};
