//! Metric record formatting.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::debug;

use crate::event::Envelope;
use crate::flatten::flatten_with_prefix;

/// The downstream metrics system being targeted.
///
/// Resolved once at configuration time; every formatting and URL rule branches off this.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Consumer {
    /// Prometheus text exposition format.
    #[default]
    Prometheus,

    /// SignalFx-style JSON gauge batch.
    SignalFx,
}

/// Replaces every character outside `[A-Za-z0-9_:]` with `_`.
pub fn sanitize(s: &str) -> String {
    s.chars().map(|c| if is_valid_name_char(c) { c } else { '_' }).collect()
}

#[inline]
fn is_valid_name_char(c: char) -> bool {
    // Matches a regular expression of [a-zA-Z0-9_:].
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

#[derive(Serialize)]
struct SignalFxRecord<'a> {
    metric: &'a str,
    dimensions: SignalFxDimensions<'a>,
    value: &'a Number,
    timestamp: &'a Number,
}

#[derive(Serialize)]
struct SignalFxDimensions<'a> {
    path: String,
    policy: &'a str,
}

impl Consumer {
    /// Formats a single metric record.
    ///
    /// Returns `None` if `value` is not numeric; such fields are silently dropped.
    pub fn format_metric(self, envelope: &Envelope<'_>, metric_name: &str, value: &Value) -> Option<String> {
        let value = value.as_number()?;

        Some(match self {
            Self::SignalFx => {
                let record = SignalFxRecord {
                    metric: metric_name,
                    dimensions: SignalFxDimensions {
                        path: format!("{}_{}", envelope.identifier, sanitize(envelope.path)),
                        policy: envelope.policy_name,
                    },
                    value,
                    timestamp: envelope.end_time,
                };

                serde_json::to_string(&record).unwrap()
            }
            Self::Prometheus => format!(
                "{}{{policy=\"{}\",version=\"{}\"}} {} {}\n",
                metric_name,
                envelope.policy_name,
                envelope.version_text(),
                value,
                envelope.end_time
            ),
        })
    }

    /// Formats all metric records for the envelope's measurement payload.
    ///
    /// Scalar numeric content produces one record named by `metric_type`. Mapping content is flattened, rooted at
    /// `metric_type`, and produces one record per numeric leaf, joined with `delimiter`. Content that is neither
    /// produces an empty string, not an error.
    pub fn format_metrics(self, envelope: &Envelope<'_>, metric_type: &str, delimiter: &str) -> String {
        match envelope.content {
            Value::Number(_) => self
                .format_metric(envelope, metric_type, envelope.content)
                .unwrap_or_default(),
            Value::Object(_) => {
                let flattened = flatten_with_prefix(metric_type, envelope.content);
                debug!(?flattened, "Flattened measurement content.");

                flattened
                    .iter()
                    .filter_map(|(path, leaf)| self.format_metric(envelope, path, leaf))
                    .collect::<Vec<_>>()
                    .join(delimiter)
            }
            _ => {
                debug!("Measurement content is neither a mapping nor a number.");
                String::new()
            }
        }
    }
}
