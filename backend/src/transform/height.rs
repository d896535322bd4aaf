//! Height corrections for one HS edge.
//!
//! Grid cells are addressed by the integer index of their lower-left node,
//! written `"i/j"`. A point in cell `(i, j)` is interpolated from the nodes
//! `(i, j)`, `(i + 1, j)`, `(i, j + 1)` and `(i + 1, j + 1)`.

use std::collections::HashMap;

use crate::error::PointError;
use crate::models::{GridParams, PlaneParams};

/// Planar linear correction.
pub fn plane(params: &PlaneParams, x: f64, y: f64, h: f64, direction: f64) -> f64 {
    let dx = x - params.x0;
    let dy = y - params.y0;
    h + direction * (params.a + params.b * dx + params.c * dy)
}

/// Cell index containing `(x, y)` plus the fractional offsets inside it.
///
/// Fails with [`PointError::OutOfGrid`] when the index does not fit an `i64`.
pub fn cell_index(params: &GridParams, x: f64, y: f64) -> Result<((i64, i64), (f64, f64)), PointError> {
    let gx = (x - params.x0) / params.cell_size;
    let gy = (y - params.y0) / params.cell_size;
    let i = gx.floor();
    let j = gy.floor();
    Ok(((to_index(i)?, to_index(j)?), (gx - i, gy - j)))
}

// i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
fn to_index(v: f64) -> Result<i64, PointError> {
    if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Ok(v as i64)
    } else {
        Err(PointError::OutOfGrid)
    }
}

/// Store key of a grid node.
pub fn cell_id(i: i64, j: i64) -> String {
    format!("{i}/{j}")
}

/// Keys of the four nodes around `(x, y)`: base, `+x`, `+y`, `+x+y`.
pub fn cell_corners(params: &GridParams, x: f64, y: f64) -> Result<[String; 4], PointError> {
    let ((i, j), _) = cell_index(params, x, y)?;
    let i1 = i.checked_add(1).ok_or(PointError::OutOfGrid)?;
    let j1 = j.checked_add(1).ok_or(PointError::OutOfGrid)?;
    Ok([cell_id(i, j), cell_id(i1, j), cell_id(i, j1), cell_id(i1, j1)])
}

/// Bilinear correction from fetched node values.
///
/// Fails with [`PointError::OutOfGrid`] when any of the four nodes is absent.
pub fn grid(
    params: &GridParams,
    x: f64,
    y: f64,
    h: f64,
    direction: f64,
    values: &HashMap<String, f64>,
) -> Result<f64, PointError> {
    let (_, (xr, yr)) = cell_index(params, x, y)?;
    let corners = cell_corners(params, x, y)?;
    let node = |k: usize| values.get(&corners[k]).copied().ok_or(PointError::OutOfGrid);
    let (a, b, c, d) = (node(0)?, node(1)?, node(2)?, node(3)?);

    let u = a * (1.0 - xr) * (1.0 - yr) + b * xr * (1.0 - yr) + c * (1.0 - xr) * yr + d * xr * yr;
    Ok(h + direction * u)
}
