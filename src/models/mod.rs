//! Data models representing database entities.

/// File access token model
pub mod token;
