use metrics::{counter, Counter};

/// Component-specific telemetry.
///
/// Covers the high-level delivery counters for the bridge: how many events were dropped for not being valid metric
/// sources, and how many requests were sent or failed, by failure mode.
#[derive(Clone)]
pub struct ComponentTelemetry {
    events_dropped_validation: Counter,
    requests_sent: Counter,
    http_failed_send: Counter,
    transport_failed_send: Counter,
}

impl ComponentTelemetry {
    /// Creates a new `ComponentTelemetry` instance.
    pub fn new() -> Self {
        Self {
            events_dropped_validation: counter!(
                "component_events_dropped_total",
                "intentional" => "true",
                "drop_reason" => "invalid_metric_source",
            ),
            requests_sent: counter!("component_requests_sent_total"),
            http_failed_send: counter!("component_errors_total", "error_type" => "http_send"),
            transport_failed_send: counter!("component_errors_total", "error_type" => "transport"),
        }
    }

    pub fn events_dropped_validation(&self) -> &Counter {
        &self.events_dropped_validation
    }

    pub fn requests_sent(&self) -> &Counter {
        &self.requests_sent
    }

    pub fn http_failed_send(&self) -> &Counter {
        &self.http_failed_send
    }

    pub fn transport_failed_send(&self) -> &Counter {
        &self.transport_failed_send
    }
}

impl Default for ComponentTelemetry {
    fn default() -> Self {
        Self::new()
    }
}
