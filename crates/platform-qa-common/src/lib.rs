//! Common pieces for platform-qa: errors, polling, logging and kube helpers

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod poll;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
