//! Transformation graphs over system ids.
//!
//! A [`TransformationGraph`] maps `from -> to -> edge data`. The CS graph
//! carries an ordered zone list per edge, the HS graph a named height method
//! with a direction. Graphs are built once from configuration and only read
//! afterwards, so they are shared without locking.
//!
//! Adjacency is kept in `BTreeMap`s: neighbour iteration is always in id
//! order, which makes every tie-break in [`path`] reproducible.

pub mod path;

use std::collections::BTreeMap;

use crate::models::{HsEdge, Zone};

pub use path::{distances, dual_target_path, single_target_path, Distances, ForwardingPath};

/// Directed graph keyed by system id.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformationGraph<E> {
    edges: BTreeMap<String, BTreeMap<String, E>>,
}

/// Planar coordinate system graph.
pub type CsGraph = TransformationGraph<Vec<Zone>>;

/// Height system graph.
pub type HsGraph = TransformationGraph<HsEdge>;

impl<E> TransformationGraph<E> {
    pub fn new() -> Self {
        Self {
            edges: BTreeMap::new(),
        }
    }

    /// Add or replace the edge `from -> to`.
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>, edge: E) {
        self.edges.entry(from.into()).or_default().insert(to.into(), edge);
    }

    /// Edge data for `from -> to`; `None` means there is no direct edge.
    pub fn get(&self, from: &str, to: &str) -> Option<&E> {
        self.edges.get(from).and_then(|targets| targets.get(to))
    }

    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        self.get(from, to).is_some()
    }

    /// Outgoing neighbours of `node`, in id order.
    pub fn neighbors<'a>(&'a self, node: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .get(node)
            .into_iter()
            .flat_map(|targets| targets.keys().map(String::as_str))
    }

    /// Nodes with an edge pointing at `node`, in id order.
    pub fn predecessors<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |(_, targets)| targets.contains_key(node))
            .map(|(from, _)| from.as_str())
    }

    /// Every node appearing on either side of an edge, in id order.
    pub fn nodes(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = self
            .edges
            .iter()
            .flat_map(|(from, targets)| {
                std::iter::once(from.as_str()).chain(targets.keys().map(String::as_str))
            })
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Iterate `(from, to, edge)` triples in id order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &E)> {
        self.edges.iter().flat_map(|(from, targets)| {
            targets
                .iter()
                .map(move |(to, edge)| (from.as_str(), to.as_str(), edge))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }
}

impl<E> Default for TransformationGraph<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> From<BTreeMap<String, BTreeMap<String, E>>> for TransformationGraph<E> {
    fn from(edges: BTreeMap<String, BTreeMap<String, E>>) -> Self {
        Self { edges }
    }
}

impl<E, F: Into<String>, T: Into<String>> FromIterator<(F, T, E)> for TransformationGraph<E> {
    fn from_iter<I: IntoIterator<Item = (F, T, E)>>(iter: I) -> Self {
        let mut graph = Self::new();
        for (from, to, edge) in iter {
            graph.insert(from, to, edge);
        }
        graph
    }
}
