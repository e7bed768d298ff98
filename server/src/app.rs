use std::convert::Infallible;
use std::sync::Arc;

use hyper::Request;
use tower::ServiceBuilder;
use tower::util::BoxCloneService;

use crate::handlers::http::Router;
use crate::handlers::http::utils::{JsonResponse, RequestBody};
use crate::security::ClientKey;
use crate::state::AppState;
use crate::tower_middle::{MetricsLayer, RateLimiterLayer, RecoverPanicLayer, cors_layer};

/// The full request pipeline as a single cloneable service.
pub type AppService = BoxCloneService<Request<RequestBody>, JsonResponse, Infallible>;

/// Wrap `router` in the middleware stack.
///
/// The peer address, when known, must already be in the request extensions
/// for the rate limiter to key on it.
pub async fn build_service(state: AppState, router: Arc<Router>, key: Arc<dyn ClientKey>) -> AppService {
    let cors = cors_layer(&state.config.read().await.cors);

    let service = ServiceBuilder::new()
        .layer(MetricsLayer::new(state.metrics.clone()))
        .layer(RecoverPanicLayer::new(state.metrics.clone()))
        .layer(cors)
        .layer(RateLimiterLayer::new(
            state.limiter.clone(),
            key,
            state.metrics.clone(),
        ))
        .service_fn(move |req: Request<RequestBody>| {
            let router = router.clone();
            let state = state.clone();
            async move { Ok::<_, Infallible>(router.dispatch(req, state).await) }
        });

    BoxCloneService::new(service)
}
