#![allow(dead_code)]

use bgstrans::error::ElevationResult;
use bgstrans::{AppConfig, ElevationProvider, Repository};
use futures::future::BoxFuture;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub fn zone(min: f64, max: f64, a00: f64, b00: f64) -> Value {
    json!({
        "Border": [{"X": min, "Y": min}, {"X": min, "Y": max}, {"X": max, "Y": max}, {"X": max, "Y": min}],
        "X0": 0, "Y0": 0,
        "A00": a00, "A10": 1,
        "B00": b00, "B01": 1
    })
}

/// cs1 <-> cs2 shifted by (100, 200) inside small squares,
/// cs1 <-> bgs-cad shifted by (1000, 0) everywhere.
/// hs1 <-plane-> hs2 <-grid-> hs3.
pub fn config_document() -> Value {
    json!({
        "validCSs": ["cs1", "cs2", "bgs-cad", "island"],
        "validHSs": ["hs1", "hs2", "hs3"],
        "csGraph": {
            "cs1": {
                "cs2": [zone(0.0, 10.0, 100.0, 200.0)],
                "bgs-cad": [zone(-1e6, 1e6, 1000.0, 0.0)]
            },
            "cs2": { "cs1": [zone(100.0, 210.0, -100.0, -200.0)] },
            "bgs-cad": { "cs1": [zone(-1e6, 1e6, -1000.0, 0.0)] }
        },
        "hsGraph": {
            "hs1": { "hs2": { "Type": "plane", "Name": "p12", "Direction": 1 } },
            "hs2": {
                "hs1": { "Type": "plane", "Name": "p12", "Direction": -1 },
                "hs3": { "Type": "grid", "Name": "g23", "Direction": 1 }
            },
            "hs3": { "hs2": { "Type": "grid", "Name": "g23", "Direction": -1 } }
        },
        "hTransformations": {
            "planeTransformations": { "p12": { "X0": 0, "Y0": 0, "A": 1.5, "B": 0, "C": 0 } },
            "gridTransformations": { "g23": { "DB": "g23.sqlite", "X0": 1000, "Y0": 0, "GridSize": 10 } }
        },
        "elevationTimeoutMs": 200
    })
}

pub fn config() -> AppConfig {
    AppConfig::from_json(&config_document().to_string()).unwrap()
}

/// Grid nodes around the cell `0/0`; every other cell is missing.
pub fn write_grid(dir: &Path) {
    let conn = Connection::open(dir.join("g23.sqlite")).unwrap();
    conn.execute_batch(
        "CREATE TABLE undulation_points (id TEXT PRIMARY KEY, h REAL NOT NULL);
         INSERT INTO undulation_points VALUES ('0/0', 1.0), ('1/0', 2.0), ('0/1', 3.0), ('1/1', 4.0);",
    )
    .unwrap();
}

pub fn repository_with(provider: impl ElevationProvider + 'static) -> Repository {
    Repository::from_config(&config(), Arc::new(provider))
}

pub fn production_repository_with(provider: impl ElevationProvider + 'static) -> Repository {
    let mut doc = config_document();
    doc["inProduction"] = json!(true);
    let config = AppConfig::from_json(&doc.to_string()).unwrap();
    Repository::from_config(&config, Arc::new(provider))
}

pub fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
    data.iter()
        .map(|row| row.iter().map(|s| s.to_string()).collect())
        .collect()
}

pub struct SlowProvider;

impl ElevationProvider for SlowProvider {
    fn fetch<'a>(
        &'a self,
        _source: &'a str,
        _cells: &'a [String],
    ) -> BoxFuture<'a, ElevationResult<HashMap<String, f64>>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(HashMap::new())
        })
    }
}
