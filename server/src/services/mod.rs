// server/src/services/mod.rs

pub mod auth;
pub mod xendit;

pub use auth::TokenVerifier;
pub use xendit::XenditClient;
