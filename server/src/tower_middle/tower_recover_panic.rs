use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::anyhow;
use futures_util::FutureExt;
use hyper::Request;
use hyper::header::{self, HeaderValue};
use tower::{Layer, Service};

use crate::error::ApiError;
use crate::handlers::http::utils::{JsonResponse, deliver_error};
use crate::security::Metrics;

/// Tower layer that turns a panicking request into a 500
///
/// The connection is marked `Connection: close` so the client does not
/// reuse it after the failure.
#[derive(Clone)]
pub struct RecoverPanicLayer {
    metrics: Metrics,
}

impl RecoverPanicLayer {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for RecoverPanicLayer {
    type Service = RecoverPanicService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoverPanicService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RecoverPanicService<S> {
    inner: S,
    metrics: Metrics,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<S, ReqBody> Service<Request<ReqBody>> for RecoverPanicService<S>
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
        let metrics = self.metrics.clone();
        let mut inner = self.inner.clone();
        let method = req.method().clone();
        let uri = req.uri().clone();

        Box::pin(async move {
            match AssertUnwindSafe(async move { inner.call(req).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    metrics.record_panic();

                    let err = ApiError::Internal(anyhow!("handler panicked: {}", message));
                    let mut response = deliver_error(&err, &method, &uri);
                    response
                        .headers_mut()
                        .insert(header::CONNECTION, HeaderValue::from_static("close"));
                    Ok(response)
                }
            }
        })
    }
}
