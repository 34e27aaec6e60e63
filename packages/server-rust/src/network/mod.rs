//! Transport adapters: axum router, channel connections, HTTP middleware.

pub mod config;
pub mod connection;
pub mod handlers;
pub mod middleware;
pub mod module;

pub use config::*;
pub use connection::*;
pub use handlers::AppState;
pub use module::NetworkModule;
