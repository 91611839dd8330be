//! Bounded concurrent delivery.

use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use http_body_util::{BodyExt as _, Full};
use tokio::sync::Semaphore;
use tower::{BoxError, Service, ServiceExt as _};
use tracing::{debug, error};

use super::telemetry::ComponentTelemetry;
use crate::error::GenericError;
use crate::task::spawn_traced;

/// Schedules deliveries against a fixed concurrency budget.
///
/// A fixed pool of permits bounds how many requests may be in flight at once. [`deliver`][Self::deliver] blocks until
/// a permit frees up, which is the bridge's only backpressure mechanism: an unbounded incoming event rate translates
/// into a bounded number of concurrent outbound requests.
///
/// Each permit is released exactly once, when its delivery reaches a terminal state -- success, non-2xx response, or
/// transport failure all count. The permit travels with the delivery task as an owned handle whose drop is the sole
/// release point, so a failure between acquisition and dispatch (or a panic inside the task) still returns it.
///
/// Deliveries complete out of order; two metrics for the same series may be observed by the receiving endpoint out of
/// their original temporal order. No retries are attempted, and no timeout is imposed beyond the transport's own.
pub struct DeliveryScheduler<S> {
    service: S,
    permits: Arc<Semaphore>,
    telemetry: ComponentTelemetry,
}

impl<S> DeliveryScheduler<S> {
    /// Creates a scheduler with `concurrency` delivery permits.
    pub fn new(service: S, concurrency: usize, telemetry: ComponentTelemetry) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(concurrency)),
            telemetry,
        }
    }

    #[cfg(test)]
    fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl<S, RB> DeliveryScheduler<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<RB>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + Into<BoxError>,
    RB: Body + Send + 'static,
    RB::Data: Send,
    RB::Error: Into<BoxError>,
{
    /// Dispatches a request asynchronously.
    ///
    /// Blocks until a delivery permit is available, then spawns the request and returns. Completion is handled by the
    /// spawned task: non-2xx responses and transport failures are logged as non-fatal anomalies, and the data is
    /// dropped either way.
    ///
    /// # Errors
    ///
    /// If the permit pool has been closed, an error is returned. No permit is held in that case.
    pub async fn deliver(&self, request: Request<Full<Bytes>>) -> Result<(), GenericError> {
        let permit = Arc::clone(&self.permits).acquire_owned().await?;

        let mut service = self.service.clone();
        let telemetry = self.telemetry.clone();
        let url = request.uri().to_string();

        spawn_traced(async move {
            let result = match service.ready().await {
                Ok(service) => service.call(request).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        debug!(url, %status, "Request sent.");
                        telemetry.requests_sent().increment(1);
                    } else {
                        telemetry.http_failed_send().increment(1);

                        match response.into_body().collect().await {
                            Ok(body) => {
                                let body = body.to_bytes();
                                error!(
                                    url,
                                    %status,
                                    "Received non-success response. Body: {}",
                                    String::from_utf8_lossy(&body[..])
                                );
                            }
                            Err(e) => {
                                let e: BoxError = e.into();
                                error!(url, %status, error = %e, "Failed to read response body of non-success response.");
                            }
                        }
                    }
                }
                Err(e) => {
                    let e: BoxError = e.into();
                    telemetry.transport_failed_send().increment(1);
                    error!(url, error = %e, error_source = ?e.source(), "Failed to send request.");
                }
            }

            // Terminal state reached: dropping the permit is the sole release point, so the pool is replenished no
            // matter which branch ran.
            drop(permit);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        future::Future,
        pin::Pin,
        sync::atomic::{AtomicUsize, Ordering},
        task::{Context, Poll},
        time::Duration,
    };

    use http::StatusCode;
    use http_body_util::Empty;

    use super::*;

    /// A transport whose in-flight requests park on a gate until the test opens it.
    #[derive(Clone)]
    struct GatedTransport {
        gate: Arc<Semaphore>,
        in_flight: Arc<AtomicUsize>,
        peak_in_flight: Arc<AtomicUsize>,
        status: StatusCode,
        fail: bool,
    }

    impl GatedTransport {
        fn new(status: StatusCode, fail: bool) -> Self {
            Self {
                gate: Arc::new(Semaphore::new(0)),
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak_in_flight: Arc::new(AtomicUsize::new(0)),
                status,
                fail,
            }
        }

        fn open_gate(&self, count: usize) {
            self.gate.add_permits(count);
        }
    }

    impl Service<Request<Full<Bytes>>> for GatedTransport {
        type Response = Response<Empty<Bytes>>;
        type Error = BoxError;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _: Request<Full<Bytes>>) -> Self::Future {
            let gate = Arc::clone(&self.gate);
            let in_flight = Arc::clone(&self.in_flight);
            let peak_in_flight = Arc::clone(&self.peak_in_flight);
            let status = self.status;
            let fail = self.fail;

            Box::pin(async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak_in_flight.fetch_max(current, Ordering::SeqCst);

                let _permit = gate.acquire_owned().await.unwrap();
                in_flight.fetch_sub(1, Ordering::SeqCst);

                if fail {
                    Err("connection refused".into())
                } else {
                    Ok(Response::builder().status(status).body(Empty::new()).unwrap())
                }
            })
        }
    }

    fn request() -> Request<Full<Bytes>> {
        Request::builder()
            .method(http::Method::POST)
            .uri("http://localhost:9090/metrics")
            .body(Full::new(Bytes::from_static(b"m 1 100\n")))
            .unwrap()
    }

    async fn wait_for_permits(scheduler: &DeliveryScheduler<GatedTransport>, expected: usize) {
        for _ in 0..500 {
            if scheduler.available_permits() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("permit pool never returned to {} available permits", expected);
    }

    #[tokio::test]
    async fn permit_conservation_under_load() {
        const POOL_SIZE: usize = 2;
        const DELIVERIES: usize = 6;

        let transport = GatedTransport::new(StatusCode::OK, false);
        let scheduler = Arc::new(DeliveryScheduler::new(
            transport.clone(),
            POOL_SIZE,
            ComponentTelemetry::default(),
        ));

        let issuer = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                for _ in 0..DELIVERIES {
                    scheduler.deliver(request()).await.unwrap();
                }
            })
        };

        // With the gate closed, the issuer must stall once the pool is exhausted.
        for _ in 0..500 {
            if transport.in_flight.load(Ordering::SeqCst) == POOL_SIZE {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), POOL_SIZE);
        assert_eq!(scheduler.available_permits(), 0);
        assert!(!issuer.is_finished());

        // Open the gate fully and let all deliveries drain.
        transport.open_gate(DELIVERIES);
        issuer.await.unwrap();
        wait_for_permits(&scheduler, POOL_SIZE).await;

        assert_eq!(transport.peak_in_flight.load(Ordering::SeqCst), POOL_SIZE);
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn permit_released_on_non_success_status() {
        let transport = GatedTransport::new(StatusCode::INTERNAL_SERVER_ERROR, false);
        let scheduler = DeliveryScheduler::new(transport.clone(), 1, ComponentTelemetry::default());

        transport.open_gate(1);
        scheduler.deliver(request()).await.unwrap();
        wait_for_permits(&scheduler, 1).await;
    }

    #[tokio::test]
    async fn permit_released_on_transport_failure() {
        let transport = GatedTransport::new(StatusCode::OK, true);
        let scheduler = DeliveryScheduler::new(transport.clone(), 1, ComponentTelemetry::default());

        transport.open_gate(1);
        scheduler.deliver(request()).await.unwrap();
        wait_for_permits(&scheduler, 1).await;
    }
}
