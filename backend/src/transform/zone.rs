//! Zone lookup and piecewise polynomial CS transform.

use crate::error::PointError;
use crate::models::Zone;

impl Zone {
    /// Even-odd ray cast towards `+x`.
    ///
    /// Horizontal edges never cross the ray. An edge spans the half-open
    /// interval between its end heights, so a ray through a shared vertex
    /// is counted once and a ray grazing a peak is not counted at all.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if self.border.len() < 3 {
            return false;
        }
        let mut crossings = 0usize;
        for (a, b) in self.segments() {
            if a.y == b.y || (a.y > y) == (b.y > y) {
                continue;
            }
            let x_int = a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y);
            if x_int > x {
                crossings += 1;
            }
        }
        crossings % 2 == 1
    }

    /// Apply the zone polynomials to `(x, y)`.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.x0;
        let dy = y - self.y0;
        (self.x_poly.evaluate(dx, dy), self.y_poly.evaluate(dx, dy))
    }
}

/// First zone, in declared order, containing `(x, y)`.
pub fn locate(zones: &[Zone], x: f64, y: f64) -> Result<&Zone, PointError> {
    zones
        .iter()
        .find(|zone| zone.contains(x, y))
        .ok_or(PointError::OutOfBounds)
}

/// Transform one point across a CS edge.
pub fn transform(zones: &[Zone], x: f64, y: f64) -> Result<(f64, f64), PointError> {
    locate(zones, x, y).map(|zone| zone.apply(x, y))
}
