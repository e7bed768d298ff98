//! Wire types and configuration shared by the movie API server and its tests.

pub mod config;
pub mod types;
pub mod validator;
