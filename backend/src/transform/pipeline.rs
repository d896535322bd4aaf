//! Row-level request pipeline.
//!
//! Turns the rows of a request into points, runs them through a
//! [`TransformationSession`] and formats the result back into rows, one
//! output row per input row, in the same order.
//!
//! Input rows by field count:
//!
//! | fields | meaning                         |
//! |--------|---------------------------------|
//! | 0      | empty row, echoed empty         |
//! | 1      | comment, echoed as is           |
//! | 2      | `X, Y`                          |
//! | 3      | `name, X, Y`                    |
//! | 4+     | `name, X, Y, H, extra...`       |
//!
//! # Example
//!
//! ```rust,ignore
//! use bgstrans::transform::pipeline::{transform_rows, SystemSelection};
//!
//! let selection = SystemSelection::new("cs1", "cs2", "hs1", "hs2");
//! let rows = vec![vec!["P1".into(), "5".into(), "5".into(), "100".into()]];
//! let out = transform_rows(&repo, &selection, &rows, None).await?;
//! ```

use serde::{Deserialize, Serialize};

use crate::api::logs::{LogEntry, LOG_BROADCASTER};
use crate::config::Repository;
use crate::error::{PointError, TransformResult};
use crate::models::Point;
use crate::transform::session::TransformationSession;

/// Decimal places of every formatted number.
pub const PRECISION: usize = 3;

/// System id of a CS with an optional variant.
pub fn system_id(cs: &str, variant: Option<&str>) -> String {
    match variant.map(str::trim) {
        Some(v) if !v.is_empty() => format!("{cs}-{v}"),
        _ => cs.to_string(),
    }
}

/// Input and output systems of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSelection {
    pub ics: String,
    #[serde(default)]
    pub icsv: Option<String>,
    pub ihs: String,
    pub ocs: String,
    #[serde(default)]
    pub ocsv: Option<String>,
    pub ohs: String,
}

impl SystemSelection {
    pub fn new(
        ics: impl Into<String>,
        ocs: impl Into<String>,
        ihs: impl Into<String>,
        ohs: impl Into<String>,
    ) -> Self {
        Self {
            ics: ics.into(),
            ocs: ocs.into(),
            ihs: ihs.into(),
            ohs: ohs.into(),
            ..Self::default()
        }
    }

    pub fn input_cs(&self) -> String {
        system_id(&self.ics, self.icsv.as_deref())
    }

    pub fn output_cs(&self) -> String {
        system_id(&self.ocs, self.ocsv.as_deref())
    }
}

/// A classified input row.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRow {
    Empty,
    Comment(String),
    Point(Point),
}

fn parse_number(value: &str) -> Result<f64, PointError> {
    let trimmed = value.trim();
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PointError::Parse(trimmed.to_string()))
}

/// Classify one row and parse its numbers.
///
/// Parse failures are recorded on the point, not returned.
pub fn parse_row(fields: &[String]) -> ParsedRow {
    let (name, x, y) = match fields {
        [] => return ParsedRow::Empty,
        [name] => return ParsedRow::Comment(name.clone()),
        [x, y] => (None, x, y),
        [name, x, y, ..] => (Some(name.clone()), x, y),
    };

    let mut point = Point {
        name,
        ..Point::default()
    };
    match (parse_number(x), parse_number(y)) {
        (Ok(x), Ok(y)) => {
            point.x = x;
            point.y = y;
        }
        (Err(e), _) | (_, Err(e)) => point.xy_error = Some(e.to_string()),
    }

    if let Some(h) = fields.get(3) {
        point.has_h = true;
        match parse_number(h) {
            Ok(h) => point.h = h,
            Err(e) => point.h_error = Some(e.to_string()),
        }
        point.extra = fields[4..].to_vec();
    }

    ParsedRow::Point(point)
}

fn format_number(value: f64) -> String {
    format!("{:.*}", PRECISION, value)
}

/// Output fields for a transformed point.
pub fn format_point(point: &Point) -> Vec<String> {
    let mut row = Vec::with_capacity(4 + point.extra.len());
    if let Some(name) = &point.name {
        row.push(name.clone());
    }
    match &point.xy_error {
        Some(error) => row.push(error.clone()),
        None => {
            row.push(format_number(point.x));
            row.push(format_number(point.y));
        }
    }
    if point.has_h {
        row.push(match &point.h_error {
            Some(error) => error.clone(),
            None => format_number(point.h),
        });
    }
    row.extend(point.extra.iter().cloned());
    row
}

/// Transform a batch of rows.
///
/// Fails only for request-level errors; row-level problems are written into
/// the affected row.
pub async fn transform_rows(
    repo: &Repository,
    selection: &SystemSelection,
    rows: &[Vec<String>],
    request_id: Option<&str>,
) -> TransformResult<Vec<Vec<String>>> {
    let ics = selection.input_cs();
    let ocs = selection.output_cs();

    let mut session =
        TransformationSession::new(repo, &ics, &ocs, &selection.ihs, &selection.ohs)?;
    if let Some(id) = request_id {
        session = session.with_request_id(id);
    }

    let parsed: Vec<ParsedRow> = rows.iter().map(|r| parse_row(r)).collect();
    let mut parse_failures = 0usize;
    for (i, row) in parsed.iter().enumerate() {
        if let ParsedRow::Point(point) = row {
            if point.xy_error.is_some() || point.h_error.is_some() {
                parse_failures += 1;
            }
            session.add(i, point.clone())?;
        }
    }

    let log = |entry: LogEntry| {
        let entry = entry.with_indent(1);
        LOG_BROADCASTER.log(match request_id {
            Some(id) => entry.with_request(id),
            None => entry,
        });
    };
    log(LogEntry::info(format!(
        "{ics}/{} -> {ocs}/{}: {} rows, {} points",
        selection.ihs,
        selection.ohs,
        rows.len(),
        session.len()
    )));
    if parse_failures > 0 {
        log(LogEntry::warning(format!(
            "{parse_failures} rows with unparsable numbers"
        )));
    }

    let points = session.run().await?;

    Ok(parsed
        .iter()
        .enumerate()
        .map(|(i, row)| match row {
            ParsedRow::Empty => Vec::new(),
            ParsedRow::Comment(name) => vec![name.clone()],
            ParsedRow::Point(original) => format_point(points.get(&i).unwrap_or(original)),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_system_id() {
        assert_eq!(system_id("bgs", Some("2005")), "bgs-2005");
        assert_eq!(system_id("bgs", Some("")), "bgs");
        assert_eq!(system_id("bgs", None), "bgs");
    }

    #[test]
    fn test_row_grammar() {
        assert_eq!(parse_row(&[]), ParsedRow::Empty);
        assert_eq!(parse_row(&row(&["note"])), ParsedRow::Comment("note".into()));

        let ParsedRow::Point(p) = parse_row(&row(&["1.5", " 2.5 "])) else {
            panic!("expected point");
        };
        assert_eq!((p.name, p.x, p.y, p.has_h), (None, 1.5, 2.5, false));

        let ParsedRow::Point(p) = parse_row(&row(&["P1", "1", "2"])) else {
            panic!("expected point");
        };
        assert_eq!(p.name.as_deref(), Some("P1"));
        assert!(!p.has_h);

        let ParsedRow::Point(p) = parse_row(&row(&["P2", "1", "2", "30.25", "a", "b"])) else {
            panic!("expected point");
        };
        assert!(p.has_h);
        assert_eq!(p.h, 30.25);
        assert_eq!(p.extra, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_errors() {
        let ParsedRow::Point(p) = parse_row(&row(&["abc", "5"])) else {
            panic!("expected point");
        };
        assert_eq!(p.xy_error.as_deref(), Some("Error parsing 'abc' as number"));

        let ParsedRow::Point(p) = parse_row(&row(&["P", "1", "2", "x"])) else {
            panic!("expected point");
        };
        assert!(p.xy_error.is_none());
        assert_eq!(p.h_error.as_deref(), Some("Error parsing 'x' as number"));

        let ParsedRow::Point(p) = parse_row(&row(&["P", "NaN", "2"])) else {
            panic!("expected point");
        };
        assert!(p.xy_error.is_some());
    }

    #[test]
    fn test_format_point() {
        let point = Point::new(1.0, 2.0006).with_name("A").with_height(3.14159);
        assert_eq!(format_point(&point), row(&["A", "1.000", "2.001", "3.142"]));

        let mut failed = Point::new(0.0, 0.0);
        failed.xy_error = Some(PointError::OutOfBounds.to_string());
        assert_eq!(format_point(&failed), row(&["point out of transformation bounds"]));

        let mut extra = Point::new(1.0, 1.0).with_height(0.0);
        extra.h_error = Some(PointError::OutOfGrid.to_string());
        extra.extra = row(&["code"]);
        assert_eq!(
            format_point(&extra),
            row(&["1.000", "1.000", "point out of height model bounds", "code"])
        );
    }
}
