//! HTTP client.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};
use tower::{BoxError, Service};

use crate::error::GenericError;

/// An HTTP client.
///
/// Wraps a hyper-based client as a `tower` service, so that callers can stay generic over their transport. Supports
/// both HTTP and HTTPS (platform root certificates are used for server certificate validation), over HTTP/1.1, with
/// connection pooling handled by the underlying client.
#[derive(Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HttpClient {
    /// Creates a new HTTPS-capable client.
    ///
    /// # Errors
    ///
    /// If the platform's root certificate store could not be loaded, an error is returned.
    pub fn https() -> Result<Self, GenericError> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_or_http()
            .enable_http1()
            .build();

        let inner = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .build(connector);

        Ok(Self { inner })
    }

    /// Sends a request to the server, and waits for a response.
    ///
    /// # Errors
    ///
    /// If there was an error sending the request, an error is returned.
    pub async fn send(&self, req: Request<Full<Bytes>>) -> Result<Response<Incoming>, BoxError> {
        self.inner.request(req).await.map_err(Into::into)
    }
}

impl Service<Request<Full<Bytes>>> for HttpClient {
    type Response = Response<Incoming>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let fut = self.inner.request(req);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}
