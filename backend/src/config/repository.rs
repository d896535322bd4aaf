//! Immutable configuration shared by every request.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::elevation::{ElevationProvider, SqliteElevationProvider};
use crate::error::{ConfigResult, SystemKind, TransformError, TransformResult};
use crate::graph::{CsGraph, HsGraph};
use crate::models::{GridParams, HeightMethod, HsEdge, PlaneParams, Zone};

use super::AppConfig;

/// Graphs, method tables and the elevation provider for one loaded configuration.
///
/// Built once at startup and passed explicitly (usually as `Arc<Repository>`).
/// Nothing in here changes after construction.
pub struct Repository {
    valid_cs: BTreeSet<String>,
    valid_hs: BTreeSet<String>,
    cs_graph: CsGraph,
    hs_graph: HsGraph,
    plane_methods: BTreeMap<String, PlaneParams>,
    grid_methods: BTreeMap<String, GridParams>,
    reference_cs: String,
    elevation: Arc<dyn ElevationProvider>,
    elevation_timeout: Duration,
    in_production: bool,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("valid_cs", &self.valid_cs)
            .field("valid_hs", &self.valid_hs)
            .field("cs_edges", &self.cs_graph.edge_count())
            .field("hs_edges", &self.hs_graph.edge_count())
            .field("reference_cs", &self.reference_cs)
            .field("elevation_timeout", &self.elevation_timeout)
            .finish()
    }
}

impl Repository {
    /// Build from a decoded configuration and an elevation provider.
    pub fn from_config(config: &AppConfig, elevation: Arc<dyn ElevationProvider>) -> Self {
        let cs_graph: CsGraph = config
            .cs_graph
            .iter()
            .flat_map(|(from, targets)| {
                targets.iter().map(move |(to, zones)| {
                    (from.clone(), to.clone(), zones.iter().map(Zone::from).collect::<Vec<_>>())
                })
            })
            .collect();
        let hs_graph: HsGraph = config
            .hs_graph
            .iter()
            .flat_map(|(from, targets)| {
                targets
                    .iter()
                    .map(move |(to, edge)| (from.clone(), to.clone(), edge.clone()))
            })
            .collect();

        Self {
            valid_cs: config.valid_css.iter().cloned().collect(),
            valid_hs: config.valid_hss.iter().cloned().collect(),
            cs_graph,
            hs_graph,
            plane_methods: config.h_transformations.plane.clone(),
            grid_methods: config.h_transformations.grid.clone(),
            reference_cs: config.reference_cs().to_string(),
            elevation,
            elevation_timeout: Duration::from_millis(config.elevation_timeout_ms()),
            in_production: config.in_production,
        }
    }

    /// Load, validate and check a configuration file, backed by SQLite grid stores.
    ///
    /// `grid_directory` overrides the directory named in the file. Returns
    /// the repository plus any consistency warnings.
    pub fn open(
        path: impl AsRef<Path>,
        grid_directory: Option<PathBuf>,
    ) -> ConfigResult<(Self, Vec<String>)> {
        let (config, warnings) = AppConfig::load(path)?.into_checked()?;
        let directory = grid_directory.unwrap_or_else(|| config.grid_directory());
        let provider = Arc::new(SqliteElevationProvider::new(directory));
        Ok((Self::from_config(&config, provider), warnings))
    }

    pub fn cs_graph(&self) -> &CsGraph {
        &self.cs_graph
    }

    pub fn hs_graph(&self) -> &HsGraph {
        &self.hs_graph
    }

    pub fn valid_cs(&self) -> &BTreeSet<String> {
        &self.valid_cs
    }

    pub fn valid_hs(&self) -> &BTreeSet<String> {
        &self.valid_hs
    }

    pub fn reference_cs(&self) -> &str {
        &self.reference_cs
    }

    pub fn elevation(&self) -> &dyn ElevationProvider {
        self.elevation.as_ref()
    }

    pub fn elevation_timeout(&self) -> Duration {
        self.elevation_timeout
    }

    pub fn in_production(&self) -> bool {
        self.in_production
    }

    /// Check one system id against the valid set for its kind.
    pub fn check_system(&self, kind: SystemKind, role: &'static str, id: &str) -> TransformResult<()> {
        let valid = match kind {
            SystemKind::Cs => &self.valid_cs,
            SystemKind::Hs => &self.valid_hs,
        };
        if valid.contains(id) {
            Ok(())
        } else {
            Err(TransformError::InvalidSystem {
                kind,
                role,
                id: id.to_string(),
            })
        }
    }

    /// Check the four ids of a request, inputs first.
    pub fn validate_systems(&self, ics: &str, ocs: &str, ihs: &str, ohs: &str) -> TransformResult<()> {
        self.check_system(SystemKind::Cs, "input", ics)?;
        self.check_system(SystemKind::Cs, "output", ocs)?;
        self.check_system(SystemKind::Hs, "input", ihs)?;
        self.check_system(SystemKind::Hs, "output", ohs)
    }

    /// Zones of the CS edge `from -> to`.
    pub fn zones(&self, from: &str, to: &str) -> TransformResult<&[Zone]> {
        self.cs_graph
            .get(from, to)
            .map(Vec::as_slice)
            .ok_or_else(|| TransformError::MissingEdge {
                from: from.to_string(),
                to: to.to_string(),
            })
    }

    /// HS edge `from -> to`.
    pub fn hs_edge(&self, from: &str, to: &str) -> TransformResult<&HsEdge> {
        self.hs_graph
            .get(from, to)
            .ok_or_else(|| TransformError::MissingEdge {
                from: from.to_string(),
                to: to.to_string(),
            })
    }

    /// Parameters of the method an HS edge names.
    pub fn height_method(&self, edge: &HsEdge) -> TransformResult<HeightMethod> {
        let unknown = || {
            TransformError::Unsupported(format!("unknown {} method '{}'", edge.kind, edge.name))
        };
        match edge.kind.as_str() {
            HsEdge::PLANE => self
                .plane_methods
                .get(&edge.name)
                .copied()
                .map(HeightMethod::Plane)
                .ok_or_else(unknown),
            HsEdge::GRID => self
                .grid_methods
                .get(&edge.name)
                .cloned()
                .map(HeightMethod::Grid)
                .ok_or_else(unknown),
            other => Err(TransformError::Unsupported(format!(
                "method type '{other}'"
            ))),
        }
    }
}
