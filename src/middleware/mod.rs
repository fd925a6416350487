pub mod auth;
pub mod security;

pub use auth::{auth_middleware, optional_auth_middleware, AuthUser, MaybeAuthUser};
pub use security::security_headers_middleware;
