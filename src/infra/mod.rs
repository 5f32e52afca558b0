//! Infrastructure adapters and runtime bootstrap.

pub mod artifacts;
pub mod db;
pub mod error;
pub mod http;
pub mod notify;
pub mod telemetry;
