//! Telemetry events and their metric envelope.

use serde_json::{Map, Number, Value};

/// A telemetry event.
///
/// Events are string-keyed documents handed to the bridge one at a time by the host. The bridge only consumes the
/// metric envelope fields and the measurement payload (`content`); any other fields ride along untouched, and remain
/// available for URL template interpolation.
#[derive(Clone, Debug)]
pub struct TelemetryEvent {
    fields: Map<String, Value>,
}

impl TelemetryEvent {
    /// Creates an event from a JSON document.
    ///
    /// Returns `None` if `value` is not an object: only structured input is supported, since key flattening requires
    /// visibility into field names.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Gets a top-level field of the event.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Extracts the metric envelope, if the event carries all required fields.
    ///
    /// Returns `None` when any required field is missing or unusable. That is not an error: partial and irrelevant
    /// events are expected in the input stream, and simply produce no metrics.
    pub fn envelope(&self) -> Option<Envelope<'_>> {
        Envelope::from_event(self)
    }

    /// Resolves `%{field}` placeholders in `template` from the event's top-level fields.
    ///
    /// Placeholders naming fields that are missing, or that have no plain text form, are left in place.
    pub fn interpolate(&self, template: &str) -> String {
        let mut resolved = String::with_capacity(template.len());
        let mut remaining = template;

        while let Some(start) = remaining.find("%{") {
            resolved.push_str(&remaining[..start]);

            let placeholder = &remaining[start..];
            match placeholder.find('}') {
                Some(end) => {
                    let name = &placeholder[2..end];
                    match self.get(name).and_then(value_as_text) {
                        Some(text) => resolved.push_str(&text),
                        None => resolved.push_str(&placeholder[..=end]),
                    }
                    remaining = &placeholder[end + 1..];
                }
                None => {
                    // Unterminated placeholder; emit the rest verbatim.
                    resolved.push_str(placeholder);
                    remaining = "";
                }
            }
        }

        resolved.push_str(remaining);
        resolved
    }
}

/// The envelope fields identifying and timestamping a metric.
///
/// Borrowed from a [`TelemetryEvent`] after validation: an `Envelope` only exists when all seven required fields are
/// present and usable.
pub struct Envelope<'a> {
    /// Source/device instance key.
    pub identifier: &'a str,

    /// Sensor/subscription path.
    pub path: &'a str,

    /// Metric type label.
    pub metric_type: &'a str,

    /// Collection policy label.
    pub policy_name: &'a str,

    /// Schema/collector version. Either a string or a number.
    pub version: &'a Value,

    /// Timestamp, used verbatim as the metric timestamp.
    pub end_time: &'a Number,

    /// The measurement payload. Either a single numeric value or an arbitrarily nested mapping.
    pub content: &'a Value,
}

impl<'a> Envelope<'a> {
    fn from_event(event: &'a TelemetryEvent) -> Option<Self> {
        let identifier = event.get("identifier")?.as_str()?;
        let path = event.get("path")?.as_str()?;
        let metric_type = event.get("type")?.as_str()?;
        let policy_name = event.get("policy_name")?.as_str()?;

        let version = event.get("version")?;
        if !version.is_string() && !version.is_number() {
            return None;
        }

        let end_time = event.get("end_time")?.as_number()?;
        let content = event.get("content")?;

        Some(Self {
            identifier,
            path,
            metric_type,
            policy_name,
            version,
            end_time,
            content,
        })
    }

    /// Renders the schema version as plain text, without surrounding quotes for string versions.
    pub fn version_text(&self) -> String {
        value_as_text(self.version).unwrap_or_default()
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(value: Value) -> TelemetryEvent {
        TelemetryEvent::from_value(value).expect("test events are objects")
    }

    fn valid_event() -> TelemetryEvent {
        event(json!({
            "identifier": "dev1",
            "path": "a.b",
            "type": "temp",
            "policy_name": "p1",
            "version": "2",
            "end_time": 100,
            "content": { "x": 1 },
        }))
    }

    #[test]
    fn non_object_rejected() {
        assert!(TelemetryEvent::from_value(json!(42)).is_none());
        assert!(TelemetryEvent::from_value(json!(["a"])).is_none());
        assert!(TelemetryEvent::from_value(json!("event")).is_none());
    }

    #[test]
    fn envelope_requires_all_fields() {
        let required = ["identifier", "path", "type", "policy_name", "version", "end_time", "content"];

        assert!(valid_event().envelope().is_some());

        for field in required {
            let mut fields = valid_event().fields;
            fields.remove(field);
            let partial = TelemetryEvent { fields };
            assert!(partial.envelope().is_none(), "envelope should be rejected without '{}'", field);
        }
    }

    #[test]
    fn envelope_rejects_unusable_field_types() {
        let mut fields = valid_event().fields;
        fields.insert("identifier".to_string(), json!(42));
        assert!(TelemetryEvent { fields }.envelope().is_none());

        let mut fields = valid_event().fields;
        fields.insert("end_time".to_string(), json!("not-a-number"));
        assert!(TelemetryEvent { fields }.envelope().is_none());

        let mut fields = valid_event().fields;
        fields.insert("version".to_string(), json!({ "major": 2 }));
        assert!(TelemetryEvent { fields }.envelope().is_none());
    }

    #[test]
    fn version_accepts_string_or_number() {
        let ev = valid_event();
        assert_eq!(ev.envelope().unwrap().version_text(), "2");

        let mut fields = ev.fields;
        fields.insert("version".to_string(), json!(3));
        let ev = TelemetryEvent { fields };
        assert_eq!(ev.envelope().unwrap().version_text(), "3");
    }

    #[test]
    fn interpolate_resolves_fields() {
        let ev = valid_event();
        assert_eq!(
            ev.interpolate("http://host/%{identifier}/metrics?v=%{version}"),
            "http://host/dev1/metrics?v=2"
        );
    }

    #[test]
    fn interpolate_leaves_unresolvable_placeholders() {
        let ev = valid_event();
        assert_eq!(ev.interpolate("http://host/%{missing}"), "http://host/%{missing}");
        assert_eq!(ev.interpolate("http://host/%{content}"), "http://host/%{content}");
        assert_eq!(ev.interpolate("http://host/%{unterminated"), "http://host/%{unterminated");
    }
}
