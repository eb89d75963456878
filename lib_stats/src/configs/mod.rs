//! # Configuration Modules
//!
//! Loading, merging and validating the options a client is constructed from.

/// Client options, their environment loader, and the validated `ClientConfig`.
pub mod client_config;
