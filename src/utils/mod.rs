pub mod geo;
pub mod jwt;
pub mod password;
pub mod text;

pub use jwt::{encode_access_token, encode_refresh_token};
pub use password::{hash_password, verify_password};
