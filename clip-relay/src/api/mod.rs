//! HTTP control API.
//!
//! Exposes tenant lifecycle control, logs, stats and a live event stream.

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, AppState};
