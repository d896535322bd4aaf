//! # BGSTrans - coordinate and height transformation service
//!
//! Transforms batches of points between planar coordinate systems (CS) and
//! height systems (HS). CS edges are piecewise cubic polynomials valid inside
//! polygonal zones; HS edges are plane corrections or bilinear interpolation
//! over an undulation grid held in an external store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Request   │────▶│   Routes    │────▶│  CS stage   │────▶│  HS stage   │
//! │ rows + ids  │     │ (graph BFS) │     │ (per point) │     │ (per edge)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bgstrans::{Repository, SystemSelection, transform_rows};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (repo, _warnings) = Repository::open("config.json", None).unwrap();
//!     let selection = SystemSelection::new("cs1", "cs2", "hs1", "hs2");
//!     let rows = vec![vec!["P1".into(), "100".into(), "200".into(), "5".into()]];
//!     let out = transform_rows(&repo, &selection, &rows, None).await.unwrap();
//!     println!("{:?}", out);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Zones, polynomials, height methods, points
//! - [`config`] - Configuration document and the shared [`Repository`]
//! - [`validation`] - Configuration schema validation
//! - [`graph`] - Transformation graphs and route resolution
//! - [`transform`] - Zone and height math, sessions, row pipeline
//! - [`elevation`] - Grid value providers
//! - [`parser`] - Point file reading and writing
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Configuration
pub mod config;
pub mod validation;

// Routing
pub mod graph;

// Transformation
pub mod elevation;
pub mod transform;

// Point files
pub mod parser;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ElevationError, PathError, PointError, PointFileError, ServerError, SystemKind,
    TransformError,
};

// =============================================================================
// Re-exports - Models and configuration
// =============================================================================

pub use config::{AppConfig, ConfigReport, Repository};
pub use models::{GridParams, HeightMethod, HsEdge, PlaneParams, Point, Polynomial, Vertex, Zone};

// =============================================================================
// Re-exports - Graphs
// =============================================================================

pub use graph::{
    distances, dual_target_path, single_target_path, CsGraph, ForwardingPath, HsGraph,
    TransformationGraph,
};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use elevation::{ElevationProvider, MemoryElevationProvider, SqliteElevationProvider};
pub use transform::{
    transform_rows, SessionState, SystemSelection, TransformationSession,
};

// =============================================================================
// Re-exports - Validation and parsing
// =============================================================================

pub use parser::{detect_delimiter, detect_encoding, read_point_file, Delimiter, PointFile};
pub use validation::{is_valid_config, validate_config};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{TransformationRequest, TransformationResponse};

// Server
pub mod server {
    pub use crate::api::server::{build_router, start_server};
}
