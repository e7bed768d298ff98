pub mod filters;
pub mod json_error;
pub mod movie;
pub mod server_config;
pub mod token;
pub mod user;

pub use self::filters::{Filters, Metadata};
pub use self::json_error::ErrorResponse;
pub use self::movie::{Movie, MovieInput, MoviePatch, Runtime};
pub use self::token::{TokenScope, TokenView};
pub use self::user::{ActivateUserInput, CredentialsInput, RegisterUserInput};
