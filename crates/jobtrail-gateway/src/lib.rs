//! # Jobtrail Gateway
//!
//! Axum HTTP surface for the dispatch engine: the periodic-trigger endpoint,
//! a manual force-send mode, per-recipient diagnostics and invocation history.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
