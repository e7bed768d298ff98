pub mod debug_vars;
pub mod healthcheck;
pub mod movies;
pub mod routes;
pub mod tokens;
pub mod users;
pub mod utils;

pub use routes::{HandlerResult, Router, build_api_router};
