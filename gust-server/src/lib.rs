//! HTTP surface and keep-warm job for a single loaded text-to-image model.

pub mod config;
pub mod error;
pub mod keep_warm;
pub mod routes;
pub mod state;

pub use routes::create_app;
pub use state::AppState;
