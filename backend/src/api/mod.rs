//! HTTP API module.
//!
//! This module provides the HTTP server, its request/response types and the
//! service log stream.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{build_router, start_server};
pub use types::*;
