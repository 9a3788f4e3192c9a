// scribe - a small blog service: posts, groups, comments, follows

// Request/response layer
pub mod handlers;
pub mod routes;
pub mod viewer;

// Persistence and validation
pub mod forms;
pub mod models;
pub mod storage;

// Supporting pieces
pub mod media;
pub mod page_cache;
pub mod pagination;
pub mod render;

// Common utilities
pub mod app_state;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use app_state::AppState;
pub use error::{AppError, AppResult};
