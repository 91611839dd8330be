//! Time series extraction.

use super::formatter::{sanitize, Consumer};
use crate::event::TelemetryEvent;

/// A fully-formatted time series payload, ready for delivery.
#[derive(Debug, Eq, PartialEq)]
pub struct TimeSeries {
    /// Suffix appended to the configured base URL. May be empty.
    pub url_suffix: String,

    /// The request body.
    pub body: String,
}

/// Extracts the time series payload for an event.
///
/// Returns `None` when the event is missing any required envelope field. This is the only validation-failure path,
/// and it is silent by design: no delivery is attempted, and no error is surfaced.
pub fn extract_time_series(consumer: Consumer, event: &TelemetryEvent) -> Option<TimeSeries> {
    let envelope = event.envelope()?;
    let metric_type = sanitize(envelope.metric_type);

    Some(match consumer {
        Consumer::SignalFx => {
            // Identity travels in the payload dimensions, so the URL is left untouched. The gauge family is forced
            // here; there is no way to pick gauge versus counter from the event alone.
            let records = consumer.format_metrics(&envelope, &metric_type, ",");

            TimeSeries {
                url_suffix: String::new(),
                body: format!("{{\"gauge\": [ {} ]}}", records),
            }
        }
        Consumer::Prometheus => {
            // Records are already newline-terminated, so they join with no delimiter.
            let body = consumer.format_metrics(&envelope, &metric_type, "");
            let instance = sanitize(&format!("{}_{}", envelope.identifier, envelope.path));

            TimeSeries {
                url_suffix: format!("/instances/{}", instance),
                body,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use similar_asserts::assert_eq;

    use super::*;

    fn event_value() -> Value {
        json!({
            "identifier": "dev1",
            "path": "a.b",
            "type": "temp",
            "policy_name": "p1",
            "version": "2",
            "end_time": 100,
            "content": { "x": 1, "y": 2 },
        })
    }

    fn event_from(value: Value) -> TelemetryEvent {
        TelemetryEvent::from_value(value).unwrap()
    }

    #[test]
    fn missing_envelope_field_yields_nothing() {
        let required = ["identifier", "path", "type", "policy_name", "version", "end_time", "content"];

        for field in required {
            let mut value = event_value();
            value.as_object_mut().unwrap().remove(field);

            let event = event_from(value);
            assert_eq!(
                extract_time_series(Consumer::Prometheus, &event),
                None,
                "extraction should be silent without '{}'",
                field
            );
            assert_eq!(extract_time_series(Consumer::SignalFx, &event), None);
        }
    }

    #[test]
    fn prometheus_format_fidelity() {
        let event = event_from(event_value());
        let series = extract_time_series(Consumer::Prometheus, &event).unwrap();

        assert_eq!(series.url_suffix, "/instances/dev1_a_b");
        assert_eq!(
            series.body,
            "temp_x{policy=\"p1\",version=\"2\"} 1 100\ntemp_y{policy=\"p1\",version=\"2\"} 2 100\n"
        );
    }

    #[test]
    fn signalfx_format_fidelity() {
        let event = event_from(event_value());
        let series = extract_time_series(Consumer::SignalFx, &event).unwrap();

        assert_eq!(series.url_suffix, "");
        assert_eq!(
            series.body,
            "{\"gauge\": [ \
             {\"metric\":\"temp_x\",\"dimensions\":{\"path\":\"dev1_a_b\",\"policy\":\"p1\"},\"value\":1,\"timestamp\":100},\
             {\"metric\":\"temp_y\",\"dimensions\":{\"path\":\"dev1_a_b\",\"policy\":\"p1\"},\"value\":2,\"timestamp\":100} \
             ]}"
        );
    }

    #[test]
    fn scalar_content_uses_metric_type_as_name() {
        let mut value = event_value();
        value.as_object_mut().unwrap().insert("content".to_string(), json!(42));

        let event = event_from(value);
        let series = extract_time_series(Consumer::Prometheus, &event).unwrap();
        assert_eq!(series.body, "temp{policy=\"p1\",version=\"2\"} 42 100\n");
    }

    #[test]
    fn metric_type_is_sanitized() {
        let mut value = event_value();
        value.as_object_mut().unwrap().insert("type".to_string(), json!("temp/outer"));
        value.as_object_mut().unwrap().insert("content".to_string(), json!(42));

        let event = event_from(value);
        let series = extract_time_series(Consumer::Prometheus, &event).unwrap();
        assert!(series.body.starts_with("temp_outer{"));
    }

    #[test]
    fn url_suffix_is_sanitized() {
        let mut value = event_value();
        value
            .as_object_mut()
            .unwrap()
            .insert("identifier".to_string(), json!("dev 1"));
        value
            .as_object_mut()
            .unwrap()
            .insert("path".to_string(), json!("if/eth0"));

        let event = event_from(value);
        let series = extract_time_series(Consumer::Prometheus, &event).unwrap();
        assert_eq!(series.url_suffix, "/instances/dev_1_if_eth0");
    }

    #[test]
    fn unsupported_content_degrades_to_empty_payload() {
        let mut value = event_value();
        value.as_object_mut().unwrap().insert("content".to_string(), json!("text"));

        let event = event_from(value.clone());
        let series = extract_time_series(Consumer::Prometheus, &event).unwrap();
        assert_eq!(series.body, "");

        let event = event_from(value);
        let series = extract_time_series(Consumer::SignalFx, &event).unwrap();
        assert_eq!(series.body, "{\"gauge\": [  ]}");
    }
}
