use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::Request;
use hyper::header::{HeaderName, HeaderValue};
use tower::{Layer, Service};

use crate::error::ApiError;
use crate::handlers::http::utils::{JsonResponse, deliver_error};
use crate::security::{ClientKey, Metrics, RateLimiter};

/// Tower layer for rate limiting
///
/// Wraps any service that produces `JsonResponse`s and rejects clients
/// whose bucket is empty with a 429 before the request reaches it.
#[derive(Clone)]
pub struct RateLimiterLayer {
    limiter: RateLimiter,
    key: Arc<dyn ClientKey>,
    metrics: Metrics,
}

impl RateLimiterLayer {
    pub fn new(limiter: RateLimiter, key: Arc<dyn ClientKey>, metrics: Metrics) -> Self {
        Self { limiter, key, metrics }
    }
}

impl<S> Layer<S> for RateLimiterLayer {
    type Service = RateLimiterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimiterService {
            inner,
            limiter: self.limiter.clone(),
            key: self.key.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimiterService<S> {
    inner: S,
    limiter: RateLimiter,
    key: Arc<dyn ClientKey>,
    metrics: Metrics,
}

impl<S, ReqBody> Service<Request<ReqBody>> for RateLimiterService<S>
where
    S: Service<Request<ReqBody>, Response = JsonResponse> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = JsonResponse;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let limiter = self.limiter.clone();
        let metrics = self.metrics.clone();
        let mut inner = self.inner.clone();

        let client = if limiter.is_enabled() {
            self.key.client_key(req.headers(), req.extensions())
        } else {
            None
        };

        Box::pin(async move {
            match client {
                Some(client) => {
                    if !limiter.admit(&client).await {
                        tracing::debug!(client = %client, "Bucket empty");
                        metrics.record_rate_limited();

                        let mut response =
                            deliver_error(&ApiError::RateLimitExceeded, req.method(), req.uri());
                        response.headers_mut().insert(
                            HeaderName::from_static("retry-after"),
                            HeaderValue::from_static("1"),
                        );
                        return Ok(response);
                    }
                }
                None if limiter.is_enabled() => {
                    tracing::debug!("No client key for request, skipping rate limit");
                }
                None => {}
            }

            inner.call(req).await
        })
    }
}
