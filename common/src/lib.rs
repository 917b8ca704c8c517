//! Common utilities shared by the tally crates.
//!
//! This crate holds the error type, application configuration, logging
//! bootstrap and duration parsing used by `tally-core` and the launcher.

pub mod config;
pub mod duration;
pub mod error;
pub mod logging;

pub use config::{Master, TallyConfig, TallyConfigBuilder};
pub use duration::{format_duration, parse_duration};
pub use error::{CommonError, ErrorContext, Result};
pub use logging::init_logging;
