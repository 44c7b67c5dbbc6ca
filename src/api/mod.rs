//! HTTP surface over the recovery core.

pub mod server;
pub mod types;

pub use server::{ApiError, ApiState, ServerHandle, build_router, start_server};
