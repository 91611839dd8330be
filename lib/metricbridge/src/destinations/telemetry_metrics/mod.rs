//! Telemetry Metrics destination.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, Uri};
use http_body::Body;
use http_body_util::Full;
use metricbridge_config::GenericConfiguration;
use serde::Deserialize;
use tower::{BoxError, Service};
use tracing::{debug, warn};

use crate::components::destinations::{Destination, DestinationBuilder, DestinationContext};
use crate::error::GenericError;
use crate::event::TelemetryEvent;
use crate::generic_error;
use crate::net::client::HttpClient;

pub mod extractor;
use self::extractor::extract_time_series;

pub mod formatter;
use self::formatter::Consumer;

mod scheduler;
use self::scheduler::DeliveryScheduler;

mod telemetry;
use self::telemetry::ComponentTelemetry;

/// Default content type, matching the Prometheus text exposition format (the default consumer).
const DEFAULT_CONTENT_TYPE: &str = "plain/text; version=0.0.4; charset=utf-8";

const DEFAULT_REQUEST_CONCURRENCY: usize = 4;

fn default_http_method() -> String {
    "post".to_owned()
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_owned()
}

fn default_request_concurrency() -> usize {
    DEFAULT_REQUEST_CONCURRENCY
}

/// A predicate deciding whether an event is eligible for output.
pub type EventFilter = Arc<dyn Fn(&TelemetryEvent) -> bool + Send + Sync>;

/// Telemetry Metrics destination.
///
/// Forwards telemetry events, reshaped into metric form, to a remote endpoint over HTTP. Multiple consumer formats
/// are supported, each with its own key-sanitization and batching rules, and deliveries are multiplexed up to a
/// configured concurrency ceiling. Out-of-order arrival at the consumer is an accepted risk of the multiplexing.
///
/// Only structured (JSON-like) telemetry payloads are supported: key flattening requires visibility into field names,
/// which binary-encoded payloads cannot offer without the underlying model.
#[derive(Deserialize)]
pub struct TelemetryMetricsConfiguration {
    /// Base URL to deliver to.
    ///
    /// May contain `%{field}` placeholders, resolved from each event's top-level fields.
    url: String,

    /// HTTP verb to use. Only `put` and `post` are supported.
    ///
    /// Defaults to `post`.
    #[serde(default = "default_http_method")]
    http_method: String,

    /// Static headers merged into every request.
    ///
    /// Defaults to empty.
    #[serde(default)]
    headers: HashMap<String, String>,

    /// Value for the `Content-Type` header.
    ///
    /// Always takes effect, even when `headers` also specifies a content type. Defaults to the Prometheus text
    /// exposition content type.
    #[serde(default = "default_content_type")]
    content_type: String,

    /// The consumer format to target.
    ///
    /// Either `prometheus` or `signalfx`; unknown values are rejected when the configuration is loaded. Defaults to
    /// `prometheus`.
    #[serde(default)]
    consumer: Consumer,

    /// Concurrency ceiling for in-flight deliveries.
    ///
    /// Defaults to 4.
    #[serde(default = "default_request_concurrency")]
    request_concurrency: usize,

    #[serde(skip)]
    event_filter: Option<EventFilter>,
}

impl TelemetryMetricsConfiguration {
    /// Creates a new `TelemetryMetricsConfiguration` from the given configuration.
    ///
    /// # Errors
    ///
    /// If a required option is missing, or an option has an invalid value, an error is returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        Ok(config.as_typed()?)
    }

    /// Sets the eligibility filter applied to every event before any other processing.
    ///
    /// Events the filter rejects are skipped silently. When no filter is installed, all events are eligible.
    pub fn with_event_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&TelemetryEvent) -> bool + Send + Sync + 'static,
    {
        self.event_filter = Some(Arc::new(filter));
        self
    }

    fn http_method(&self) -> Result<Method, GenericError> {
        match self.http_method.as_str() {
            "put" => Ok(Method::PUT),
            "post" => Ok(Method::POST),
            other => Err(generic_error!(
                "Unsupported HTTP method '{}': only put and post are supported.",
                other
            )),
        }
    }

    fn static_headers(&self) -> Result<HeaderMap, GenericError> {
        let mut headers = HeaderMap::with_capacity(self.headers.len() + 1);
        for (name, value) in &self.headers {
            headers.insert(HeaderName::from_bytes(name.as_bytes())?, HeaderValue::from_str(value)?);
        }

        // The configured content type always wins, even when the static headers specify one.
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(&self.content_type)?);

        Ok(headers)
    }

    /// Builds the destination against a custom transport.
    ///
    /// The transport is any `tower` service taking HTTP requests; the stock HTTPS transport is used when building
    /// through [`DestinationBuilder`].
    ///
    /// # Errors
    ///
    /// If any configured option has an invalid value, an error is returned.
    pub fn build_with_transport<S>(&self, service: S) -> Result<TelemetryMetrics<S>, GenericError> {
        if self.request_concurrency == 0 {
            return Err(generic_error!("request_concurrency must be greater than 0"));
        }

        let telemetry = ComponentTelemetry::new();

        Ok(TelemetryMetrics {
            method: self.http_method()?,
            url: self.url.clone(),
            headers: self.static_headers()?,
            consumer: self.consumer,
            scheduler: DeliveryScheduler::new(service, self.request_concurrency, telemetry.clone()),
            telemetry,
            event_filter: self.event_filter.clone(),
        })
    }
}

#[async_trait]
impl DestinationBuilder for TelemetryMetricsConfiguration {
    async fn build(&self) -> Result<Box<dyn Destination + Send>, GenericError> {
        let client = HttpClient::https()?;
        Ok(Box::new(self.build_with_transport(client)?))
    }
}

/// The running Telemetry Metrics destination.
///
/// Generic over its transport so hosts and tests can swap the wire out; see
/// [`build_with_transport`][TelemetryMetricsConfiguration::build_with_transport].
pub struct TelemetryMetrics<S> {
    method: Method,
    url: String,
    headers: HeaderMap,
    consumer: Consumer,
    scheduler: DeliveryScheduler<S>,
    telemetry: ComponentTelemetry,
    event_filter: Option<EventFilter>,
}

impl<S, RB> TelemetryMetrics<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<RB>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + Into<BoxError>,
    RB: Body + Send + 'static,
    RB::Data: Send,
    RB::Error: Into<BoxError>,
{
    /// Processes a single event.
    ///
    /// Ineligible and invalid events are skipped silently. For everything else, the time series payload is extracted
    /// and handed to the delivery scheduler, blocking if the concurrency ceiling has been reached.
    ///
    /// # Errors
    ///
    /// If the delivery URL could not be constructed, or the request could not be dispatched, an error is returned. No
    /// permit remains held on any error path.
    async fn receive(&self, event: &TelemetryEvent) -> Result<(), GenericError> {
        if let Some(filter) = &self.event_filter {
            if !filter(event) {
                return Ok(());
            }
        }

        let series = match extract_time_series(self.consumer, event) {
            Some(series) => series,
            None => {
                // Not a valid metric source. Skipping is the contract here, not an error.
                self.telemetry.events_dropped_validation().increment(1);
                return Ok(());
            }
        };

        let url = format!("{}{}", event.interpolate(&self.url), series.url_suffix);

        debug!(
            http_method = %self.method,
            url = url.as_str(),
            body = series.body.as_str(),
            "HTTP push."
        );

        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(url.parse::<Uri>()?)
            .body(Full::new(Bytes::from(series.body)))?;
        *request.headers_mut() = self.headers.clone();

        self.scheduler.deliver(request).await
    }
}

#[async_trait]
impl<S, RB> Destination for TelemetryMetrics<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<RB>> + Clone + Send + Sync + 'static,
    S::Future: Send,
    S::Error: Send + Into<BoxError>,
    RB: Body + Send + 'static,
    RB::Data: Send,
    RB::Error: Into<BoxError>,
{
    async fn run(self: Box<Self>, mut context: DestinationContext) -> Result<(), GenericError> {
        debug!("Telemetry metrics destination started.");

        while let Some(event) = context.events().recv().await {
            if let Err(e) = self.receive(&event).await {
                // One bad event must never stop the stream: log it, with the event for context, and move on.
                warn!(error = %e, event = ?event, "Failed to push metrics for event.");
            }
        }

        debug!("Telemetry metrics destination stopped.");

        Ok(())
    }
}
