//! sigsettle service: configuration, HTTP API and application lifecycle.

pub mod api;
pub mod app;
pub mod config;
pub mod error;

pub use api::{create_router, AppState};
pub use app::{run_poll_loop, Application};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
