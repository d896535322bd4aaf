//! Elevation-value providers for grid height models.
//!
//! A grid method names a backing store (`DB` in the configuration). During
//! the HS stage the session asks the provider for every cell corner it needs
//! in one batch; ids that the store does not know are simply absent from the
//! returned map.
//!
//! - [`SqliteElevationProvider`] - one SQLite file per store under a directory
//! - [`MemoryElevationProvider`] - in-process tables, for tests and embedding

use futures::future::BoxFuture;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ElevationError, ElevationResult};

/// Table holding the undulation values, one row per grid node.
pub const UNDULATION_TABLE: &str = "undulation_points";

/// SQLite caps bound parameters per statement; stay well below it.
const QUERY_CHUNK: usize = 500;

/// Virtual machine steps between cancellation checks.
const CANCEL_CHECK_OPS: i32 = 1_000;

/// Source of undulation values keyed by grid cell id.
pub trait ElevationProvider: Send + Sync {
    /// Look up `cells` in `source`.
    fn fetch<'a>(
        &'a self,
        source: &'a str,
        cells: &'a [String],
    ) -> BoxFuture<'a, ElevationResult<HashMap<String, f64>>>;
}

// =============================================================================
// SQLite
// =============================================================================

/// Reads `<directory>/<source>` SQLite files, read-only.
///
/// A connection is opened per lookup on the blocking pool and dropped when the
/// lookup ends, so nothing is held between requests. Dropping the lookup
/// future (a timeout, a closed request) interrupts the running query.
#[derive(Debug, Clone)]
pub struct SqliteElevationProvider {
    directory: PathBuf,
}

impl SqliteElevationProvider {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn store_path(&self, source: &str) -> ElevationResult<PathBuf> {
        let relative = Path::new(source);
        let plain = !source.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(ElevationError::UnknownSource(source.to_string()));
        }
        let path = self.directory.join(relative);
        if !path.is_file() {
            return Err(ElevationError::Storage(format!(
                "grid store not found: {}",
                path.display()
            )));
        }
        Ok(path)
    }
}

/// Raised flag aborts the store query it was handed to.
#[derive(Debug, Default)]
struct CancelOnDrop(Arc<AtomicBool>);

impl CancelOnDrop {
    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn query_store(
    path: &Path,
    cells: &[String],
    cancelled: Arc<AtomicBool>,
) -> ElevationResult<HashMap<String, f64>> {
    let storage = |e: rusqlite::Error| ElevationError::Storage(format!("{}: {e}", path.display()));

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(storage)?;
    let flag = Arc::clone(&cancelled);
    conn.progress_handler(CANCEL_CHECK_OPS, Some(move || flag.load(Ordering::SeqCst)));

    let mut values = HashMap::with_capacity(cells.len());
    for chunk in cells.chunks(QUERY_CHUNK) {
        if cancelled.load(Ordering::SeqCst) {
            return Err(ElevationError::Storage(format!(
                "{}: lookup cancelled",
                path.display()
            )));
        }
        let placeholders = vec!["?"; chunk.len()].join(",");
        let sql = format!("SELECT id, h FROM {UNDULATION_TABLE} WHERE id IN ({placeholders})");
        let mut stmt = conn.prepare(&sql).map_err(storage)?;
        let rows = stmt
            .query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(storage)?;
        for row in rows {
            let (id, h) = row.map_err(storage)?;
            values.insert(id, h);
        }
    }
    Ok(values)
}

impl ElevationProvider for SqliteElevationProvider {
    fn fetch<'a>(
        &'a self,
        source: &'a str,
        cells: &'a [String],
    ) -> BoxFuture<'a, ElevationResult<HashMap<String, f64>>> {
        Box::pin(async move {
            if cells.is_empty() {
                return Ok(HashMap::new());
            }
            let path = self.store_path(source)?;
            let cells = cells.to_vec();
            let guard = CancelOnDrop::default();
            let cancelled = guard.flag();
            tokio::task::spawn_blocking(move || query_store(&path, &cells, cancelled))
                .await
                .map_err(|e| ElevationError::Storage(format!("Task join error: {e}")))?
        })
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Fixed tables held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryElevationProvider {
    sources: HashMap<String, HashMap<String, f64>>,
}

impl MemoryElevationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store.
    pub fn with_source<I, K>(mut self, source: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.sources.insert(
            source.into(),
            values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        );
        self
    }
}

impl ElevationProvider for MemoryElevationProvider {
    fn fetch<'a>(
        &'a self,
        source: &'a str,
        cells: &'a [String],
    ) -> BoxFuture<'a, ElevationResult<HashMap<String, f64>>> {
        Box::pin(async move {
            let table = self
                .sources
                .get(source)
                .ok_or_else(|| ElevationError::UnknownSource(source.to_string()))?;
            Ok(cells
                .iter()
                .filter_map(|id| table.get(id).map(|h| (id.clone(), *h)))
                .collect())
        })
    }
}
