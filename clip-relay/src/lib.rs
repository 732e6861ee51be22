//! clip-relay: watch many tenants' content sources and relay each new upload
//! through a resolve, acquire, normalize and publish pipeline.

pub mod api;
pub mod browser;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod pipeline;
pub mod resolver;
pub mod scheduler;
pub mod utils;

pub use error::{Error, Result};
