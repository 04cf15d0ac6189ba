//! velox-server: the build orchestrator
//!
//! [`BuildServer`] composes template download, plugin resolution and the
//! build driver behind a build cache and an in-flight set, and serves the
//! result as the `BuildService` RPC.

mod error;
mod server;
mod service;

pub use error::{Result, ServerError};
pub use server::{
    BUILD_CACHE_CAPACITY, BUILD_CACHE_TTL, BuildOutcome, BuildServer, CACHED_MARKER,
    IN_FLIGHT_CAPACITY, IN_FLIGHT_TTL, REAPER_INTERVAL, ServerOptions, validate,
};
pub use service::{SERVICE_NAME, serve, startup_sweep};
