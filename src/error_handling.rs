//! Error types shared across the service.

pub mod types;
