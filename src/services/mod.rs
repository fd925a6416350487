pub mod admin;
pub mod assignment;
pub mod auth;
pub mod bootstrap_admin;
pub mod comment;
pub mod duplicate;
pub mod email;
pub mod issue;
pub mod issue_type;
pub mod notification;
pub mod push;
pub mod push_subscription;
pub mod query;
pub mod region;
pub mod settings;
pub mod stats;
pub mod storage;
pub mod tracker;
