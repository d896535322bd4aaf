//! Transformation configuration.
//!
//! The configuration document is loaded once at startup, validated against
//! the embedded JSON schema, decoded into [`AppConfig`] and then turned into
//! an immutable [`Repository`] that every request reads from.
//!
//! ```json
//! {
//!   "validCSs": ["cs1", "cs2"],
//!   "validHSs": ["hs1", "hs2"],
//!   "csGraph": { "cs1": { "cs2": [ { "Border": [{"X": 0, "Y": 0}, ...], "X0": 0, "Y0": 0, "A00": 0, ... } ] } },
//!   "hsGraph": { "hs1": { "hs2": { "Type": "plane", "Name": "p12", "Direction": 1 } } },
//!   "hTransformations": {
//!     "planeTransformations": { "p12": { "X0": 0, "Y0": 0, "A": 0.1, "B": 0, "C": 0 } },
//!     "gridTransformations": {}
//!   }
//! }
//! ```

pub mod repository;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::models::{GridParams, HsEdge, PlaneParams, Polynomial, Vertex, Zone};
use crate::validation::validate_config;

pub use repository::Repository;

/// Reference CS that grid height models are defined against.
pub const DEFAULT_REFERENCE_CS: &str = "bgs-cad";

/// Directory holding grid model stores.
pub const DEFAULT_GRID_DIRECTORY: &str = "/grid-models";

/// Elevation lookup timeout in milliseconds.
pub const DEFAULT_ELEVATION_TIMEOUT_MS: u64 = 3000;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "BGSTRANS_CONFIG";

/// Environment variable overriding the grid directory.
pub const GRID_DIR_ENV: &str = "BGSTRANS_GRID_DIR";

/// Configuration file used when neither flag nor environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub in_production: bool,

    #[serde(rename = "validCSs")]
    pub valid_css: Vec<String>,

    #[serde(rename = "validHSs")]
    pub valid_hss: Vec<String>,

    #[serde(default)]
    pub cs_graph: BTreeMap<String, BTreeMap<String, Vec<ZoneConfig>>>,

    #[serde(default)]
    pub hs_graph: BTreeMap<String, BTreeMap<String, HsEdge>>,

    #[serde(default)]
    pub h_transformations: TransformationMethods,

    /// Reference CS for grid height models.
    #[serde(default, rename = "referenceCS")]
    pub reference_cs: Option<String>,

    /// Directory holding the grid stores.
    #[serde(default)]
    pub grid_directory: Option<PathBuf>,

    /// Upper bound for one batched elevation lookup.
    #[serde(default)]
    pub elevation_timeout_ms: Option<u64>,
}

/// Height method tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformationMethods {
    #[serde(default, rename = "gridTransformations")]
    pub grid: BTreeMap<String, GridParams>,

    #[serde(default, rename = "planeTransformations")]
    pub plane: BTreeMap<String, PlaneParams>,
}

/// One zone of a CS edge as written in the configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneConfig {
    #[serde(rename = "Border")]
    pub border: Vec<Vertex>,
    #[serde(rename = "X0", default)]
    pub x0: f64,
    #[serde(rename = "Y0", default)]
    pub y0: f64,

    #[serde(rename = "A00", default)]
    pub a00: f64,
    #[serde(rename = "A10", default)]
    pub a10: f64,
    #[serde(rename = "A01", default)]
    pub a01: f64,
    #[serde(rename = "A20", default)]
    pub a20: f64,
    #[serde(rename = "A11", default)]
    pub a11: f64,
    #[serde(rename = "A02", default)]
    pub a02: f64,
    #[serde(rename = "A30", default)]
    pub a30: f64,
    #[serde(rename = "A21", default)]
    pub a21: f64,
    #[serde(rename = "A12", default)]
    pub a12: f64,
    #[serde(rename = "A03", default)]
    pub a03: f64,

    #[serde(rename = "B00", default)]
    pub b00: f64,
    #[serde(rename = "B10", default)]
    pub b10: f64,
    #[serde(rename = "B01", default)]
    pub b01: f64,
    #[serde(rename = "B20", default)]
    pub b20: f64,
    #[serde(rename = "B11", default)]
    pub b11: f64,
    #[serde(rename = "B02", default)]
    pub b02: f64,
    #[serde(rename = "B30", default)]
    pub b30: f64,
    #[serde(rename = "B21", default)]
    pub b21: f64,
    #[serde(rename = "B12", default)]
    pub b12: f64,
    #[serde(rename = "B03", default)]
    pub b03: f64,
}

impl From<&ZoneConfig> for Zone {
    fn from(z: &ZoneConfig) -> Self {
        Zone::new(
            z.border.clone(),
            z.x0,
            z.y0,
            Polynomial([
                z.a00, z.a10, z.a01, z.a20, z.a11, z.a02, z.a30, z.a21, z.a12, z.a03,
            ]),
            Polynomial([
                z.b00, z.b10, z.b01, z.b20, z.b11, z.b02, z.b30, z.b21, z.b12, z.b03,
            ]),
        )
    }
}

/// Outcome of a consistency check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigReport {
    /// Problems that make the configuration unusable.
    pub errors: Vec<String>,
    /// Problems that only surface when a request routes through them.
    pub warnings: Vec<String>,
}

impl ConfigReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl AppConfig {
    /// Read, schema-check and decode a configuration file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Schema-check and decode a configuration document.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let document: Value = serde_json::from_str(content)?;
        validate_config(&document).map_err(ConfigError::Schema)?;
        Ok(serde_json::from_value(document)?)
    }

    pub fn reference_cs(&self) -> &str {
        self.reference_cs.as_deref().unwrap_or(DEFAULT_REFERENCE_CS)
    }

    pub fn grid_directory(&self) -> PathBuf {
        self.grid_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GRID_DIRECTORY))
    }

    pub fn elevation_timeout_ms(&self) -> u64 {
        self.elevation_timeout_ms
            .unwrap_or(DEFAULT_ELEVATION_TIMEOUT_MS)
    }

    /// Referential consistency of graphs, methods and system sets.
    pub fn check(&self) -> ConfigReport {
        let mut report = ConfigReport::default();
        let valid_cs: BTreeSet<&str> = self.valid_css.iter().map(String::as_str).collect();
        let valid_hs: BTreeSet<&str> = self.valid_hss.iter().map(String::as_str).collect();

        for (from, targets) in &self.cs_graph {
            for (to, zones) in targets {
                for id in [from, to] {
                    if !valid_cs.contains(id.as_str()) {
                        report
                            .errors
                            .push(format!("CS graph node '{id}' is not a valid CS"));
                    }
                }
                if zones.is_empty() {
                    report
                        .warnings
                        .push(format!("CS edge {from} -> {to} has no zones"));
                }
                for (i, zone) in zones.iter().enumerate() {
                    if zone.border.len() < 3 {
                        report.errors.push(format!(
                            "CS edge {from} -> {to}, zone {i}: border needs at least 3 vertices"
                        ));
                    }
                }
            }
        }

        for (from, targets) in &self.hs_graph {
            for (to, edge) in targets {
                for id in [from, to] {
                    if !valid_hs.contains(id.as_str()) {
                        report
                            .errors
                            .push(format!("HS graph node '{id}' is not a valid HS"));
                    }
                }
                if edge.direction != 1.0 && edge.direction != -1.0 {
                    report.errors.push(format!(
                        "HS edge {from} -> {to}: direction must be 1 or -1, got {}",
                        edge.direction
                    ));
                }
                let known = match edge.kind.as_str() {
                    HsEdge::PLANE => self.h_transformations.plane.contains_key(&edge.name),
                    HsEdge::GRID => self.h_transformations.grid.contains_key(&edge.name),
                    other => {
                        report.warnings.push(format!(
                            "HS edge {from} -> {to}: unsupported method type '{other}'"
                        ));
                        continue;
                    }
                };
                if !known {
                    report.errors.push(format!(
                        "HS edge {from} -> {to}: unknown {} method '{}'",
                        edge.kind, edge.name
                    ));
                }
            }
        }

        for (name, grid) in &self.h_transformations.grid {
            if !(grid.cell_size > 0.0) {
                report
                    .errors
                    .push(format!("Grid method '{name}': GridSize must be positive"));
            }
        }

        let uses_grid = self
            .hs_graph
            .values()
            .flat_map(BTreeMap::values)
            .any(HsEdge::is_grid);
        if uses_grid && !valid_cs.contains(self.reference_cs()) {
            report.warnings.push(format!(
                "Grid height methods need reference CS '{}', which is not a valid CS",
                self.reference_cs()
            ));
        }

        // Node messages repeat once per edge; keep the first of each.
        let mut seen = BTreeSet::new();
        report.errors.retain(|e| seen.insert(e.clone()));

        report
    }

    /// Fail with [`ConfigError::Inconsistent`] unless [`AppConfig::check`] found
    /// no errors; warnings are returned alongside.
    pub fn into_checked(self) -> ConfigResult<(Self, Vec<String>)> {
        let report = self.check();
        if report.is_ok() {
            Ok((self, report.warnings))
        } else {
            Err(ConfigError::Inconsistent(report.errors))
        }
    }
}

/// Resolve the configuration path: flag, then environment, then default.
pub fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Resolve the grid directory override: flag, then environment.
pub fn resolve_grid_directory(flag: Option<&Path>) -> Option<PathBuf> {
    flag.map(Path::to_path_buf)
        .or_else(|| std::env::var_os(GRID_DIR_ENV).map(PathBuf::from))
}
