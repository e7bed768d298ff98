//! JSON movie API: movie CRUD with optimistic concurrency, account
//! registration and activation, bearer-token authentication with
//! permission codes, per-client rate limiting.

pub mod app;
pub mod cli;
pub mod database;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod security;
pub mod server;
pub mod state;
pub mod tower_middle;
