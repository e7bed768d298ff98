use std::future::Future;
use std::pin::Pin;

use hyper::header::{self, HeaderValue};
use hyper::{Method, Request};
use tracing::debug;

use crate::database::users::User;
use crate::error::ApiError;
use crate::handlers::http::utils::{JsonResponse, RequestBody, deliver_error};
use crate::handlers::http::{debug_vars, healthcheck, movies, tokens, users};
use crate::security::{Identity, Requirement};
use crate::state::AppState;

pub type HandlerResult = Result<JsonResponse, ApiError>;

type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

// ---------------------------------------------------------------------------
// Handler type aliases
// ---------------------------------------------------------------------------
//
//   OpenHandler:  no gate. Receives (req, state, identity); the identity
//                 may be anonymous.
//
//   GatedHandler: the router runs the permission gate for the route's
//                 `Requirement` first. Receives (req, state, user) with the
//                 user that passed.

type OpenHandler = Box<dyn Fn(Request<RequestBody>, AppState, Identity) -> HandlerFuture + Send + Sync>;

type GatedHandler = Box<dyn Fn(Request<RequestBody>, AppState, User) -> HandlerFuture + Send + Sync>;

enum RouteKind {
    Open(OpenHandler),
    Gated(Requirement, GatedHandler),
}

struct Route {
    method: Method,
    path: String,
    kind: RouteKind,
}

/// Method + path dispatch with `:param` segments.
pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    // ── Open ─────────────────────────────────────────────────────────────────

    pub fn open<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(Request<RequestBody>, AppState, Identity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Open(Box::new(move |req, state, identity| {
                Box::pin(handler(req, state, identity))
            })),
        });
        self
    }

    pub fn get<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<RequestBody>, AppState, Identity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.open(Method::GET, path, handler)
    }

    pub fn post<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<RequestBody>, AppState, Identity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.open(Method::POST, path, handler)
    }

    pub fn put<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<RequestBody>, AppState, Identity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.open(Method::PUT, path, handler)
    }

    // ── Gated ────────────────────────────────────────────────────────────────
    //
    // The router resolves the requirement before the handler is called;
    // handlers must not repeat the check.

    pub fn gated<F, Fut>(mut self, method: Method, path: &str, requirement: Requirement, handler: F) -> Self
    where
        F: Fn(Request<RequestBody>, AppState, User) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Gated(
                requirement,
                Box::new(move |req, state, user| Box::pin(handler(req, state, user))),
            ),
        });
        self
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Resolve the caller, route, gate and run the handler. Every failure is
    /// rendered here, and every response varies on `Authorization`.
    pub async fn dispatch(&self, req: Request<RequestBody>, state: AppState) -> JsonResponse {
        let method = req.method().clone();
        let uri = req.uri().clone();

        let mut response = match self.route(req, state).await {
            Ok(response) => response,
            Err(err) => deliver_error(&err, &method, &uri),
        };

        response
            .headers_mut()
            .append(header::VARY, HeaderValue::from_static("Authorization"));
        response
    }

    async fn route(&self, req: Request<RequestBody>, state: AppState) -> HandlerResult {
        let identity = state
            .authenticator
            .resolve(req.headers().get(header::AUTHORIZATION))
            .await?;

        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let mut path_known = false;

        for route in &self.routes {
            if !Self::path_matches(&route.path, &path) {
                continue;
            }
            path_known = true;
            if route.method != method {
                continue;
            }

            return match &route.kind {
                RouteKind::Open(h) => h(req, state, identity).await,
                RouteKind::Gated(requirement, h) => {
                    let user = state.gate.enforce(&identity, *requirement).await?.clone();
                    h(req, state, user).await
                }
            };
        }

        debug!("No route for {} {}", method, path);
        if path_known {
            Err(ApiError::MethodNotAllowed(method))
        } else {
            Err(ApiError::NotFound)
        }
    }

    // ── Path matching ────────────────────────────────────────────────────────

    pub fn path_matches(route_path: &str, request_path: &str) -> bool {
        // Strip query string from incoming request path before comparing.
        let clean = request_path.split('?').next().unwrap_or(request_path);

        if route_path == clean {
            return true;
        }

        // Segment-by-segment matching for `:param` wildcards.
        // e.g.  "/v1/movies/:id"  matches  "/v1/movies/42"
        let route_segs: Vec<&str> = route_path.split('/').collect();
        let path_segs: Vec<&str> = clean.split('/').collect();

        if route_segs.len() != path_segs.len() {
            return false;
        }

        route_segs
            .iter()
            .zip(path_segs.iter())
            .all(|(r, p)| (r.starts_with(':') && !p.is_empty()) || r == p)
    }
}

// ---------------------------------------------------------------------------
// API router
//
//   .get / .post / .put  → Open:  handler gets (req, state, identity)
//   .gated(..)           → Gated: handler gets (req, state, user)
// ---------------------------------------------------------------------------

pub fn build_api_router() -> Router {
    let read = Requirement::Permission("movies:read");
    let write = Requirement::Permission("movies:write");

    Router::new()
        .get("/v1/healthcheck", healthcheck::handle_healthcheck)
        .get("/debug/vars", debug_vars::handle_debug_vars)
        // Movies
        .gated(Method::GET, "/v1/movies", read, movies::handle_list_movies)
        .gated(Method::POST, "/v1/movies", write, movies::handle_create_movie)
        .gated(Method::GET, "/v1/movies/:id", read, movies::handle_show_movie)
        .gated(Method::PATCH, "/v1/movies/:id", write, movies::handle_update_movie)
        .gated(Method::DELETE, "/v1/movies/:id", write, movies::handle_delete_movie)
        // Accounts
        .post("/v1/users", users::handle_register_user)
        .put("/v1/users/activated", users::handle_activate_user)
        // Tokens
        .post("/v1/tokens/authentication", tokens::handle_create_authentication_token)
        .gated(
            Method::DELETE,
            "/v1/tokens/authentication",
            Requirement::Authenticated,
            tokens::handle_revoke_authentication_tokens,
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_match_single_non_empty_segments() {
        assert!(Router::path_matches("/v1/movies/:id", "/v1/movies/42"));
        assert!(!Router::path_matches("/v1/movies/:id", "/v1/movies/"));
        assert!(!Router::path_matches("/v1/movies/:id", "/v1/movies/42/extra"));
        assert!(Router::path_matches("/v1/movies", "/v1/movies?page=2"));
        assert!(!Router::path_matches("/v1/movies", "/v1/movie"));
    }

    #[test]
    fn api_router_registers_every_endpoint() {
        let router = build_api_router();
        assert_eq!(router.routes.len(), 11);
    }
}
