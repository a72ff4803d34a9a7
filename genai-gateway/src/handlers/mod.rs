//! HTTP handlers for the gateway.

pub mod ai;
pub mod health;
pub mod metrics;

use axum::http::Uri;
use service_core::error::AppError;

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(anyhow::anyhow!("No route for {}", uri.path()))
}
