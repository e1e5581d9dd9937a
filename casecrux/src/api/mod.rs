//! HTTP surface: ML proxy routes, cache administration, liveness and metrics

mod cache_admin;
pub mod error;
mod ml;
mod server;

pub use error::ApiError;
pub use server::{ApiServer, AppState};
