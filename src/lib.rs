//! User management API
//!
//! Account registration, JWT login, profile/password/login updates,
//! soft and hard deletion, restore, and admin queries over a SQLite store.

pub mod account;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod server;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{ApiError, ApiResult};
