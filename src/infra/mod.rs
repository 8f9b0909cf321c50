//! Infrastructure adapters and runtime bootstrap.

pub mod browser;
pub mod error;
pub mod http;
pub mod telemetry;
