//! Domain models for the transformation service.
//!
//! - [`Zone`] - polygonal validity region of one piecewise polynomial CS transform
//! - [`Polynomial`] - bivariate cubic with the ten `(i, j)`, `i + j <= 3` terms
//! - [`HsEdge`] - named height method plus traversal direction
//! - [`HeightMethod`] - plane or grid height correction parameters
//! - [`Point`] - mutable per-row record carried through a batch

use serde::{Deserialize, Serialize};

// =============================================================================
// Planar geometry
// =============================================================================

/// A polygon vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Bivariate cubic polynomial.
///
/// Coefficients are stored in the order `00, 10, 01, 20, 11, 02, 30, 21, 12, 03`
/// where the digits are the powers of `dx` and `dy`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Polynomial(pub [f64; 10]);

impl Polynomial {
    /// `(i, j)` exponents matching the coefficient order.
    pub const TERMS: [(u8, u8); 10] = [
        (0, 0),
        (1, 0),
        (0, 1),
        (2, 0),
        (1, 1),
        (0, 2),
        (3, 0),
        (2, 1),
        (1, 2),
        (0, 3),
    ];

    /// Polynomial returning `dx` unchanged.
    pub fn identity_x() -> Self {
        let mut c = [0.0; 10];
        c[1] = 1.0;
        Self(c)
    }

    /// Polynomial returning `dy` unchanged.
    pub fn identity_y() -> Self {
        let mut c = [0.0; 10];
        c[2] = 1.0;
        Self(c)
    }

    /// Coefficient of `dx^i * dy^j`, if `i + j <= 3`.
    pub fn coefficient(&self, i: u8, j: u8) -> Option<f64> {
        Self::TERMS
            .iter()
            .position(|&t| t == (i, j))
            .map(|idx| self.0[idx])
    }

    /// Evaluate at the offsets from the zone origin.
    ///
    /// The summation order is fixed so results are bit-reproducible.
    pub fn evaluate(&self, dx: f64, dy: f64) -> f64 {
        let c = &self.0;
        c[0] + c[1] * dx
            + c[2] * dy
            + c[3] * dx * dx
            + c[4] * dx * dy
            + c[5] * dy * dy
            + c[6] * dx * dx * dx
            + c[7] * dx * dx * dy
            + c[8] * dx * dy * dy
            + c[9] * dy * dy * dy
    }
}

/// One spatial zone of a CS edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    /// Boundary, implicitly closed.
    pub border: Vec<Vertex>,
    pub x0: f64,
    pub y0: f64,
    /// Output X polynomial (`A` coefficients).
    pub x_poly: Polynomial,
    /// Output Y polynomial (`B` coefficients).
    pub y_poly: Polynomial,
}

impl Zone {
    pub fn new(border: Vec<Vertex>, x0: f64, y0: f64, x_poly: Polynomial, y_poly: Polynomial) -> Self {
        Self {
            border,
            x0,
            y0,
            x_poly,
            y_poly,
        }
    }

    /// Iterate boundary segments, closing the ring.
    pub fn segments(&self) -> impl Iterator<Item = (Vertex, Vertex)> + '_ {
        let n = self.border.len();
        (0..n).map(move |i| (self.border[i], self.border[(i + 1) % n]))
    }
}

// =============================================================================
// Height methods
// =============================================================================

/// Edge of the HS graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HsEdge {
    /// Method type, `"plane"` or `"grid"`.
    #[serde(rename = "Type")]
    pub kind: String,
    /// Name of the method in the matching table.
    #[serde(rename = "Name")]
    pub name: String,
    /// `+1` or `-1`; the same method serves both traversal directions.
    #[serde(rename = "Direction")]
    pub direction: f64,
}

impl HsEdge {
    pub const PLANE: &'static str = "plane";
    pub const GRID: &'static str = "grid";

    pub fn is_grid(&self) -> bool {
        self.kind == Self::GRID
    }
}

/// Planar linear height correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneParams {
    #[serde(rename = "X0")]
    pub x0: f64,
    #[serde(rename = "Y0")]
    pub y0: f64,
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "B")]
    pub b: f64,
    #[serde(rename = "C")]
    pub c: f64,
}

/// Regular undulation grid height correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    /// Backing store reference passed to the elevation provider.
    #[serde(rename = "DB")]
    pub source: String,
    #[serde(rename = "X0")]
    pub x0: f64,
    #[serde(rename = "Y0")]
    pub y0: f64,
    #[serde(rename = "GridSize")]
    pub cell_size: f64,
}

/// Resolved height method for one HS edge.
#[derive(Debug, Clone, PartialEq)]
pub enum HeightMethod {
    Plane(PlaneParams),
    Grid(GridParams),
}

// =============================================================================
// Batch points
// =============================================================================

/// Per-row record mutated in place through the CS and HS stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Point {
    pub name: Option<String>,

    pub x: f64,
    pub y: f64,
    pub xy_error: Option<String>,

    pub h: f64,
    pub has_h: bool,
    pub h_error: Option<String>,

    /// Coordinates in the reference CS, filled when a grid edge needs them.
    pub x_ref: f64,
    pub y_ref: f64,

    /// Pass-through fields after H.
    pub extra: Vec<String>,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    pub fn with_height(mut self, h: f64) -> Self {
        self.h = h;
        self.has_h = true;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Eligible for height transformation.
    pub fn needs_height(&self) -> bool {
        self.has_h && self.xy_error.is_none() && self.h_error.is_none()
    }
}
