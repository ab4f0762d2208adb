//! Request middleware.
//!
//! Middleware wraps the HTTP exchange in registration order: the first
//! registered middleware sees the request first and the response last. A
//! middleware may answer on its own without calling [`Next::run`].
//!
//! # Example
//! ```rust
//! use async_trait::async_trait;
//! use difyai::middleware::{Middleware, Next};
//! use difyai::ClientError;
//!
//! struct Tagged;
//!
//! #[async_trait]
//! impl Middleware for Tagged {
//!     async fn handle(
//!         &self,
//!         mut request: reqwest::Request,
//!         next: Next<'_>,
//!     ) -> Result<reqwest::Response, ClientError> {
//!         request
//!             .headers_mut()
//!             .insert("x-client", reqwest::header::HeaderValue::from_static("difyai"));
//!         next.run(request).await
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use crate::client::ClientError;

/// A layer around the HTTP exchange of every request.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        request: reqwest::Request,
        next: Next<'_>,
    ) -> Result<reqwest::Response, ClientError>;
}

/// The remaining middleware chain, ending in the HTTP client.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    http: &'a reqwest::Client,
    middleware: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(http: &'a reqwest::Client, middleware: &'a [Arc<dyn Middleware>]) -> Self {
        Self { http, middleware }
    }

    /// Pass the request to the next layer.
    pub fn run(self, request: reqwest::Request) -> BoxFuture<'a, Result<reqwest::Response, ClientError>> {
        match self.middleware.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    http: self.http,
                    middleware: rest,
                };
                current.handle(request, next)
            }
            None => {
                let http = self.http;
                Box::pin(async move { http.execute(request).await.map_err(ClientError::from) })
            }
        }
    }
}

/// Logs method, URL, status and latency of every exchange.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceMiddleware;

#[async_trait]
impl Middleware for TraceMiddleware {
    async fn handle(
        &self,
        request: reqwest::Request,
        next: Next<'_>,
    ) -> Result<reqwest::Response, ClientError> {
        let method = request.method().clone();
        let url = request.url().clone();
        let started = Instant::now();

        let result = next.run(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => debug!(
                %method,
                %url,
                status = response.status().as_u16(),
                elapsed_ms,
                "http exchange"
            ),
            Err(error) => debug!(%method, %url, elapsed_ms, %error, "http exchange failed"),
        }

        result
    }
}
