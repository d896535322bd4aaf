//! Coordinate and height transformation.
//!
//! - [`zone`]: zone lookup and polynomial CS transform for one edge
//! - [`height`]: plane and grid height corrections for one edge
//! - [`session`]: one batch driven through both routes
//! - [`pipeline`]: request rows in, formatted rows out

pub mod height;
pub mod pipeline;
pub mod session;
pub mod zone;

pub use pipeline::{format_point, parse_row, system_id, transform_rows, ParsedRow, SystemSelection};
pub use session::{HsStep, SessionState, TransformationSession};
pub use zone::{locate, transform};
