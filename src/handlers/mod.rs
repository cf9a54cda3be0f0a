//! HTTP request handlers (route handlers).

/// Token-gated file download
pub mod files;
/// Service health endpoint
pub mod health;
