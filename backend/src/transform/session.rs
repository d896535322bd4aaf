//! One batch transformation request.
//!
//! A session resolves both routes when it is created, collects points with
//! [`TransformationSession::add`], then [`TransformationSession::run`] drives
//! the whole batch through the CS forwarding tree and afterwards through the
//! HS route, one edge at a time.
//!
//! ```text
//! Created --add--> Populated --run--> Transformed
//!                               \---> Failed
//! ```
//!
//! Point-local failures (zone lookup, missing grid node) are recorded on the
//! point. Request-level failures (unknown system, no route, unsupported
//! method, elevation store error) abort the batch.

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use crate::api::logs::{LogEntry, LOG_BROADCASTER};
use crate::config::Repository;
use crate::error::{ElevationError, TransformError, TransformResult};
use crate::graph::{dual_target_path, single_target_path, ForwardingPath};
use crate::models::{GridParams, HeightMethod, PlaneParams, Point, Zone};
use crate::transform::{height, zone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Populated,
    Transformed,
    Failed,
}

/// Resolved CS forwarding tree with the zones of every edge.
#[derive(Debug)]
struct CsPlan<'r> {
    source: String,
    output: String,
    reference: Option<String>,
    steps: BTreeMap<String, Vec<(String, &'r [Zone])>>,
}

impl<'r> CsPlan<'r> {
    fn resolve(
        repo: &'r Repository,
        source: &str,
        output: &str,
        reference: Option<&str>,
    ) -> TransformResult<(Self, ForwardingPath)> {
        let tree = dual_target_path(repo.cs_graph(), source, output, reference)?;
        let mut steps: BTreeMap<String, Vec<(String, &'r [Zone])>> = BTreeMap::new();
        for (from, to) in tree.edges() {
            let zones = repo.zones(from, to)?;
            steps
                .entry(from.to_string())
                .or_default()
                .push((to.to_string(), zones));
        }
        let plan = Self {
            source: source.to_string(),
            output: output.to_string(),
            reference: reference.map(str::to_string),
            steps,
        };
        Ok((plan, tree))
    }

    /// Walk one point through the tree.
    ///
    /// Every branch carries its own coordinates. Output and reference
    /// coordinates are recorded when their node is reached; the first failed
    /// hop marks the point and stops the walk.
    fn walk(&self, point: &mut Point) {
        if point.xy_error.is_some() {
            return;
        }
        let mut output = None;
        let mut reference = None;
        let mut stack = vec![(self.source.as_str(), point.x, point.y)];

        while let Some((node, x, y)) = stack.pop() {
            if node == self.output {
                output = Some((x, y));
            }
            if self.reference.as_deref() == Some(node) {
                reference = Some((x, y));
            }
            for (next, zones) in self.steps.get(node).into_iter().flatten() {
                match zone::transform(zones, x, y) {
                    Ok((nx, ny)) => stack.push((next.as_str(), nx, ny)),
                    Err(e) => {
                        point.xy_error = Some(e.to_string());
                        return;
                    }
                }
            }
        }

        if let Some((x, y)) = output {
            point.x = x;
            point.y = y;
        }
        if let Some((x, y)) = reference {
            point.x_ref = x;
            point.y_ref = y;
        }
    }
}

/// One resolved edge of the HS route.
#[derive(Debug, Clone)]
pub struct HsStep {
    pub from: String,
    pub to: String,
    pub method: HeightMethod,
    pub direction: f64,
}

pub struct TransformationSession<'r> {
    repo: &'r Repository,
    cs_plan: CsPlan<'r>,
    cs_tree: ForwardingPath,
    hs_steps: Vec<HsStep>,
    points: BTreeMap<usize, Point>,
    state: SessionState,
    request_id: Option<String>,
}

impl<'r> TransformationSession<'r> {
    /// Validate the systems and resolve both routes.
    pub fn new(
        repo: &'r Repository,
        ics: &str,
        ocs: &str,
        ihs: &str,
        ohs: &str,
    ) -> TransformResult<Self> {
        repo.validate_systems(ics, ocs, ihs, ohs)?;

        let hs_route = single_target_path(repo.hs_graph(), ihs, ohs)?;
        let mut hs_steps = Vec::with_capacity(hs_route.len());
        let mut from = ihs;
        for to in &hs_route {
            let edge = repo.hs_edge(from, to)?;
            hs_steps.push(HsStep {
                from: from.to_string(),
                to: to.clone(),
                method: repo.height_method(edge)?,
                direction: edge.direction,
            });
            from = to.as_str();
        }

        let needs_reference = hs_steps
            .iter()
            .any(|s| matches!(s.method, HeightMethod::Grid(_)));
        let reference = needs_reference.then(|| repo.reference_cs());
        let (cs_plan, cs_tree) = CsPlan::resolve(repo, ics, ocs, reference)?;

        Ok(Self {
            repo,
            cs_plan,
            cs_tree,
            hs_steps,
            points: BTreeMap::new(),
            state: SessionState::Created,
            request_id: None,
        })
    }

    /// Tag log entries with a request id.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cs_tree(&self) -> &ForwardingPath {
        &self.cs_tree
    }

    pub fn hs_steps(&self) -> &[HsStep] {
        &self.hs_steps
    }

    /// Whether reference CS coordinates are computed for grid edges.
    pub fn needs_reference(&self) -> bool {
        self.cs_plan.reference.is_some()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Register a point; nothing is transformed yet.
    pub fn add(&mut self, id: usize, point: Point) -> TransformResult<()> {
        match self.state {
            SessionState::Created | SessionState::Populated => {
                self.points.insert(id, point);
                self.state = SessionState::Populated;
                Ok(())
            }
            SessionState::Transformed | SessionState::Failed => Err(TransformError::SessionFinished),
        }
    }

    /// Transform every registered point.
    pub async fn run(&mut self) -> TransformResult<BTreeMap<usize, Point>> {
        if matches!(self.state, SessionState::Transformed | SessionState::Failed) {
            return Err(TransformError::SessionFinished);
        }
        let mut points = std::mem::take(&mut self.points);

        self.log(LogEntry::info(format!(
            "Transforming {} points: {} CS edges, {} HS edges",
            points.len(),
            self.cs_tree.edges().count(),
            self.hs_steps.len()
        )));

        let plan = &self.cs_plan;
        points.par_iter_mut().for_each(|(_, point)| plan.walk(point));

        let failed = points.values().filter(|p| p.xy_error.is_some()).count();
        if failed > 0 {
            self.log(
                LogEntry::warning(format!("{failed} points outside transformation bounds"))
                    .with_indent(1),
            );
        }

        for step in &self.hs_steps {
            let result = match &step.method {
                HeightMethod::Plane(params) => {
                    apply_plane(&mut points, params, step.direction);
                    Ok(())
                }
                HeightMethod::Grid(params) => self.apply_grid(&mut points, params, step.direction).await,
            };
            if let Err(e) = result {
                self.state = SessionState::Failed;
                self.log(LogEntry::error(format!(
                    "HS edge {} -> {} failed: {e}",
                    step.from, step.to
                )));
                return Err(e);
            }
        }

        self.state = SessionState::Transformed;
        Ok(points)
    }

    async fn apply_grid(
        &self,
        points: &mut BTreeMap<usize, Point>,
        params: &GridParams,
        direction: f64,
    ) -> TransformResult<()> {
        let cells: BTreeSet<String> = points
            .values()
            .filter(|p| p.needs_height())
            .filter_map(|p| height::cell_corners(params, p.x_ref, p.y_ref).ok())
            .flatten()
            .collect();
        if cells.is_empty() {
            return Ok(());
        }
        let cells: Vec<String> = cells.into_iter().collect();

        let limit = self.repo.elevation_timeout();
        let fetch = self.repo.elevation().fetch(&params.source, &cells);
        let values = tokio::time::timeout(limit, fetch)
            .await
            .map_err(|_| ElevationError::Timeout(limit))??;

        self.log(
            LogEntry::info(format!(
                "Grid '{}': {} of {} nodes found",
                params.source,
                values.len(),
                cells.len()
            ))
            .with_indent(1),
        );

        points.par_iter_mut().for_each(|(_, p)| {
            if !p.needs_height() {
                return;
            }
            match height::grid(params, p.x_ref, p.y_ref, p.h, direction, &values) {
                Ok(h) => p.h = h,
                Err(e) => p.h_error = Some(e.to_string()),
            }
        });
        Ok(())
    }

    fn log(&self, entry: LogEntry) {
        let entry = match &self.request_id {
            Some(id) => entry.with_request(id.clone()),
            None => entry,
        };
        LOG_BROADCASTER.log(entry);
    }
}

fn apply_plane(points: &mut BTreeMap<usize, Point>, params: &PlaneParams, direction: f64) {
    points.par_iter_mut().for_each(|(_, p)| {
        if p.needs_height() {
            p.h = height::plane(params, p.x, p.y, p.h, direction);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::elevation::{ElevationProvider, MemoryElevationProvider};
    use crate::error::{ElevationResult, PathError, SystemKind};
    use futures::future::BoxFuture;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn square(offset_x: f64, offset_y: f64) -> Value {
        json!([{
            "Border": [{"X": -1000, "Y": -1000}, {"X": -1000, "Y": 1000}, {"X": 1000, "Y": 1000}, {"X": 1000, "Y": -1000}],
            "A00": offset_x, "A10": 1,
            "B00": offset_y, "B01": 1
        }])
    }

    fn wide(offset_x: f64, offset_y: f64) -> Value {
        json!([{
            "Border": [{"X": -5000, "Y": -5000}, {"X": -5000, "Y": 5000}, {"X": 5000, "Y": 5000}, {"X": 5000, "Y": -5000}],
            "A00": offset_x, "A10": 1,
            "B00": offset_y, "B01": 1
        }])
    }

    /// cs1 <-> bgs-cad <-> cs2, offsets of +100/+200 per hop forward.
    /// cs1 <-> cs3 shifted by (10, 20) inside a wider square.
    /// hs1 -plane-> hs2 -grid-> hs3.
    fn config() -> AppConfig {
        let doc = json!({
            "validCSs": ["cs1", "cs2", "cs3", "bgs-cad", "cs9"],
            "validHSs": ["hs1", "hs2", "hs3", "hs4"],
            "csGraph": {
                "cs1": { "bgs-cad": square(100.0, 200.0), "cs3": wide(10.0, 20.0) },
                "bgs-cad": { "cs1": square(-100.0, -200.0), "cs2": square(100.0, 200.0) },
                "cs2": { "bgs-cad": square(-100.0, -200.0) },
                "cs3": { "cs1": wide(-10.0, -20.0) }
            },
            "hsGraph": {
                "hs1": { "hs2": { "Type": "plane", "Name": "p12", "Direction": 1 } },
                "hs2": {
                    "hs1": { "Type": "plane", "Name": "p12", "Direction": -1 },
                    "hs3": { "Type": "grid", "Name": "g23", "Direction": 1 }
                },
                "hs3": {
                    "hs2": { "Type": "grid", "Name": "g23", "Direction": -1 },
                    "hs4": { "Type": "geoid", "Name": "x", "Direction": 1 }
                }
            },
            "hTransformations": {
                "planeTransformations": { "p12": { "X0": 0, "Y0": 0, "A": 1, "B": 0, "C": 0 } },
                "gridTransformations": { "g23": { "DB": "g.sqlite", "X0": 0, "Y0": 0, "GridSize": 100 } }
            },
            "elevationTimeoutMs": 50
        });
        AppConfig::from_json(&doc.to_string()).unwrap()
    }

    fn flat_grid(value: f64) -> MemoryElevationProvider {
        let mut nodes = Vec::new();
        for i in -20..20 {
            for j in -20..20 {
                nodes.push((height::cell_id(i, j), value));
            }
        }
        MemoryElevationProvider::new().with_source("g.sqlite", nodes)
    }

    fn repository(provider: impl ElevationProvider + 'static) -> Repository {
        Repository::from_config(&config(), Arc::new(provider))
    }

    #[tokio::test]
    async fn test_cs_only_through_reference() {
        let repo = repository(flat_grid(0.0));
        let mut session = TransformationSession::new(&repo, "cs1", "cs2", "hs1", "hs1").unwrap();
        assert!(!session.needs_reference());
        assert_eq!(session.state(), SessionState::Created);

        session.add(0, Point::new(5.0, 5.0)).unwrap();
        session.add(1, Point::new(5000.0, 5.0)).unwrap();
        assert_eq!(session.state(), SessionState::Populated);

        let points = session.run().await.unwrap();
        assert_eq!(session.state(), SessionState::Transformed);
        assert_eq!((points[&0].x, points[&0].y), (205.0, 405.0));
        assert!(points[&0].xy_error.is_none());
        assert_eq!(
            points[&1].xy_error.as_deref(),
            Some("point out of transformation bounds")
        );
    }

    #[tokio::test]
    async fn test_plane_uses_output_coordinates() {
        let repo = repository(flat_grid(0.0));
        let mut session = TransformationSession::new(&repo, "cs1", "cs1", "hs1", "hs2").unwrap();
        assert!(session.cs_tree().is_empty());

        session.add(0, Point::new(5.0, 5.0).with_height(10.0)).unwrap();
        session.add(1, Point::new(5.0, 5.0)).unwrap();
        let points = session.run().await.unwrap();
        assert_eq!(points[&0].h, 11.0);
        assert!(!points[&1].has_h);
        assert_eq!(points[&1].h, 0.0);
    }

    #[tokio::test]
    async fn test_grid_adds_reference_target() {
        let repo = repository(flat_grid(2.5));
        let mut session = TransformationSession::new(&repo, "cs1", "cs1", "hs2", "hs3").unwrap();
        assert!(session.needs_reference());
        assert!(session.cs_tree().contains("bgs-cad"));

        session.add(0, Point::new(5.0, 5.0).with_height(10.0)).unwrap();
        let points = session.run().await.unwrap();
        let p = &points[&0];
        assert_eq!((p.x, p.y), (5.0, 5.0));
        assert_eq!((p.x_ref, p.y_ref), (105.0, 205.0));
        assert!((p.h - 12.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_branches_carry_separate_coordinates() {
        let repo = repository(flat_grid(1.0));
        let mut session = TransformationSession::new(&repo, "cs1", "cs3", "hs2", "hs3").unwrap();
        let tree = session.cs_tree();
        assert!(tree.contains("bgs-cad"));
        assert!(tree.contains("cs3"));
        assert_eq!(tree.edges().filter(|(from, _)| *from == "cs1").count(), 2);

        session.add(0, Point::new(5.0, 5.0).with_height(10.0)).unwrap();
        session.add(1, Point::new(-300.0, 40.0).with_height(10.0)).unwrap();
        let points = session.run().await.unwrap();

        assert_eq!((points[&0].x, points[&0].y), (15.0, 25.0));
        assert_eq!((points[&0].x_ref, points[&0].y_ref), (105.0, 205.0));
        assert_eq!((points[&1].x, points[&1].y), (-290.0, 60.0));
        assert_eq!((points[&1].x_ref, points[&1].y_ref), (-200.0, 240.0));
        assert!(points.values().all(|p| (p.h - 11.0).abs() < 1e-12));
    }

    #[tokio::test]
    async fn test_reference_branch_failure_isolated() {
        let repo = repository(flat_grid(1.0));
        let mut session = TransformationSession::new(&repo, "cs1", "cs3", "hs2", "hs3").unwrap();
        session.add(0, Point::new(5.0, 5.0).with_height(10.0)).unwrap();
        // inside cs1 -> cs3, outside cs1 -> bgs-cad
        session.add(1, Point::new(3000.0, 5.0).with_height(10.0)).unwrap();
        session.add(2, Point::new(-5.0, 7.0).with_height(10.0)).unwrap();

        let points = session.run().await.unwrap();
        assert_eq!(
            points[&1].xy_error.as_deref(),
            Some("point out of transformation bounds")
        );
        assert!(points[&1].h_error.is_none());
        assert_eq!(points[&1].h, 10.0);

        for id in [0, 2] {
            let p = &points[&id];
            assert!(p.xy_error.is_none(), "point {id}");
            assert!((p.h - 11.0).abs() < 1e-12, "point {id}");
        }
        assert_eq!((points[&2].x, points[&2].y), (5.0, 27.0));
        assert_eq!((points[&2].x_ref, points[&2].y_ref), (95.0, 207.0));
    }

    #[tokio::test]
    async fn test_huge_reference_coordinate_out_of_grid() {
        let repo = repository(flat_grid(1.0));
        let mut session =
            TransformationSession::new(&repo, "bgs-cad", "bgs-cad", "hs2", "hs3").unwrap();
        assert!(session.cs_tree().is_empty());
        session.add(0, Point::new(1e300, 5.0).with_height(10.0)).unwrap();
        session.add(1, Point::new(5.0, -1e300).with_height(10.0)).unwrap();
        session.add(2, Point::new(5.0, 5.0).with_height(10.0)).unwrap();

        let points = session.run().await.unwrap();
        for id in [0, 1] {
            assert_eq!(
                points[&id].h_error.as_deref(),
                Some("point out of height model bounds")
            );
        }
        assert_eq!(points[&2].h, 11.0);
    }

    #[tokio::test]
    async fn test_reference_recorded_at_start() {
        let repo = repository(flat_grid(1.0));
        let mut session = TransformationSession::new(&repo, "bgs-cad", "cs2", "hs3", "hs2").unwrap();
        session.add(7, Point::new(-50.0, 60.0).with_height(3.0)).unwrap();

        let points = session.run().await.unwrap();
        let p = &points[&7];
        assert_eq!((p.x_ref, p.y_ref), (-50.0, 60.0));
        assert_eq!((p.x, p.y), (50.0, 260.0));
        assert!((p.h - 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_missing_grid_node_fails_point_only() {
        let provider = MemoryElevationProvider::new().with_source(
            "g.sqlite",
            [("1/2", 1.0), ("2/2", 1.0), ("1/3", 1.0), ("2/3", 1.0)],
        );
        let repo = repository(provider);
        let mut session = TransformationSession::new(&repo, "cs1", "cs1", "hs2", "hs3").unwrap();
        session.add(0, Point::new(50.0, 50.0).with_height(0.0)).unwrap();
        session.add(1, Point::new(500.0, 500.0).with_height(0.0)).unwrap();
        session.add(2, Point::new(5000.0, 5000.0).with_height(0.0)).unwrap();

        let points = session.run().await.unwrap();
        assert_eq!(points[&0].h, 1.0);
        assert!(points[&0].h_error.is_none());
        assert_eq!(
            points[&1].h_error.as_deref(),
            Some("point out of height model bounds")
        );
        // out of CS bounds: HS stage leaves it alone
        assert!(points[&2].xy_error.is_some());
        assert!(points[&2].h_error.is_none());
        assert_eq!(points[&2].h, 0.0);
    }

    #[tokio::test]
    async fn test_invalid_system() {
        let repo = repository(flat_grid(0.0));
        let err = TransformationSession::new(&repo, "cs1", "nope", "hs1", "hs2").err();
        assert!(matches!(
            err,
            Some(TransformError::InvalidSystem { kind: SystemKind::Cs, role: "output", .. })
        ));
    }

    #[tokio::test]
    async fn test_no_path() {
        let repo = repository(flat_grid(0.0));
        let err = TransformationSession::new(&repo, "cs1", "cs9", "hs1", "hs2").err();
        assert!(matches!(
            err,
            Some(TransformError::PathNotFound(PathError::PathNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_method_type() {
        let repo = repository(flat_grid(0.0));
        let err = TransformationSession::new(&repo, "cs1", "cs2", "hs3", "hs4").err();
        assert!(matches!(err, Some(TransformError::Unsupported(_))));
    }

    struct SlowProvider;

    impl ElevationProvider for SlowProvider {
        fn fetch<'a>(
            &'a self,
            _source: &'a str,
            _cells: &'a [String],
        ) -> BoxFuture<'a, ElevationResult<HashMap<String, f64>>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(HashMap::new())
            })
        }
    }

    #[tokio::test]
    async fn test_elevation_timeout_fails_batch() {
        let repo = repository(SlowProvider);
        let mut session = TransformationSession::new(&repo, "cs1", "cs1", "hs2", "hs3").unwrap();
        session.add(0, Point::new(5.0, 5.0).with_height(1.0)).unwrap();

        let err = session.run().await.unwrap_err();
        assert!(matches!(
            err,
            TransformError::Elevation(ElevationError::Timeout(_))
        ));
        assert!(err.is_retriable());
        assert_eq!(session.state(), SessionState::Failed);
        assert!(matches!(
            session.add(1, Point::new(0.0, 0.0)),
            Err(TransformError::SessionFinished)
        ));
    }

    #[tokio::test]
    async fn test_grid_skipped_without_heights() {
        let repo = repository(SlowProvider);
        let mut session = TransformationSession::new(&repo, "cs1", "cs1", "hs2", "hs3").unwrap();
        session.add(0, Point::new(5.0, 5.0)).unwrap();
        let points = session.run().await.unwrap();
        assert!(points[&0].h_error.is_none());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let repo = repository(flat_grid(0.0));
        let mut session = TransformationSession::new(&repo, "cs1", "cs2", "hs1", "hs2").unwrap();
        assert!(session.run().await.unwrap().is_empty());
        assert!(matches!(session.run().await, Err(TransformError::SessionFinished)));
    }
}
