pub mod admin;
pub mod auth;
pub mod comment;
pub mod issue;
pub mod issue_type;
pub mod push;
pub mod settings;
pub mod stats;

pub use auth::*;
