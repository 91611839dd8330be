//! A telemetry-to-metrics forwarding bridge.
//!
//! This crate takes telemetry events carrying a nested measurement document, flattens and reshapes the document into
//! one of several metric wire formats (Prometheus text exposition or a SignalFx-style JSON gauge batch), and delivers
//! the result to a remote metrics endpoint over HTTP, bounding how many deliveries may be in flight at once.
//!
//! The bridge is a library: a host feeds it one event at a time through a [destination][crate::destinations], and
//! decides on its own which events are eligible for output. Events that are not valid metric sources are skipped
//! silently, and failed deliveries are logged and dropped without retry.

#![deny(warnings)]
#![deny(missing_docs)]

pub mod components;
pub mod destinations;
pub mod error;
pub mod event;
pub mod flatten;
pub mod net;
pub mod task;
