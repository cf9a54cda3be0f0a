//! Business logic services.
//!
//! The issuer and the gateway share nothing but the token store.

pub mod file_gateway;
pub mod storage_roots;
pub mod token_issuer;
