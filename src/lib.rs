//! notify-gateway: real-time notification delivery for the admin dashboard.
//!
//! Library crate behind the `notify-gateway` binary; re-exports every
//! module for integration tests in `tests/`.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod presentation;
pub mod proxy;
pub mod store;
pub mod telemetry;
