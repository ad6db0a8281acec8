//! Observability: logging setup.
//!
//! Run progress events go through [`crate::events`]; this module only
//! wires `tracing` output.

mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LOG_ENV};
