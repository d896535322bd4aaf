//! Route resolution through a transformation graph.
//!
//! Resolution is two-phase: a breadth-first pass computes hop counts from a
//! root, then a path is rebuilt by walking back from the target through
//! predecessors whose distance drops by exactly one. Predecessors are tried
//! in id order, so the chosen shortest path never depends on map iteration.
//!
//! Routes to two targets meet at a single node minimizing the summed distance
//! from the source and both targets (ties go to the smallest id). This is a
//! one-Steiner-point approximation, not a minimal Steiner tree.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::TransformationGraph;
use crate::error::{PathError, PathResult};

/// Hop counts from a root; unreachable nodes are absent.
pub type Distances = BTreeMap<String, usize>;

/// Forwarding tree: node to the ordered set of nodes reached next from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardingPath {
    next: BTreeMap<String, BTreeSet<String>>,
}

impl ForwardingPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a start node and the hops following it.
    pub fn from_route(start: &str, hops: &[String]) -> Self {
        let mut path = Self::new();
        path.add_route(start, hops);
        path
    }

    /// Add the consecutive edges of `start, hops[0], hops[1], ...`.
    pub fn add_route(&mut self, start: &str, hops: &[String]) {
        let mut from = start;
        for to in hops {
            self.add_edge(from, to);
            from = to.as_str();
        }
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.next
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    /// Nodes reached from `node`, in id order.
    pub fn next<'a>(&'a self, node: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.next
            .get(node)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Every `(from, to)` pair of the tree.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.next
            .iter()
            .flat_map(|(from, set)| set.iter().map(move |to| (from.as_str(), to.as_str())))
    }

    /// Nodes touched by the tree.
    pub fn nodes(&self) -> BTreeSet<&str> {
        self.edges().flat_map(|(from, to)| [from, to]).collect()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.next.contains_key(node) || self.next.values().any(|set| set.contains(node))
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }

    /// Raw `node -> next nodes` view.
    pub fn as_map(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.next
    }
}

/// Breadth-first hop counts from `source` along outgoing edges.
pub fn distances<E>(graph: &TransformationGraph<E>, source: &str) -> Distances {
    let mut dist = Distances::new();
    let mut queue = VecDeque::new();

    dist.insert(source.to_string(), 0);
    queue.push_back(source.to_string());

    while let Some(node) = queue.pop_front() {
        let d = dist[&node];
        for next in graph.neighbors(&node) {
            if !dist.contains_key(next) {
                dist.insert(next.to_string(), d + 1);
                queue.push_back(next.to_string());
            }
        }
    }

    dist
}

/// Shortest route from `source` to `target`, excluding `source`.
///
/// Returns an empty route when both are the same node.
pub fn single_target_path<E>(
    graph: &TransformationGraph<E>,
    source: &str,
    target: &str,
) -> PathResult<Vec<String>> {
    let dist = distances(graph, source);
    path_from_distances(graph, &dist, source, target)
}

/// Rebuild a shortest route using distances rooted at `source`.
pub fn path_from_distances<E>(
    graph: &TransformationGraph<E>,
    dist: &Distances,
    source: &str,
    target: &str,
) -> PathResult<Vec<String>> {
    let not_found = || PathError::PathNotFound {
        from: source.to_string(),
        to: target.to_string(),
    };

    let mut remaining = *dist.get(target).ok_or_else(not_found)?;
    let mut route = Vec::with_capacity(remaining);
    let mut current = target.to_string();

    while remaining > 0 {
        let previous = graph
            .predecessors(&current)
            .find(|p| dist.get(*p) == Some(&(remaining - 1)))
            .ok_or_else(not_found)?
            .to_string();
        route.push(std::mem::replace(&mut current, previous));
        remaining -= 1;
    }

    route.reverse();
    Ok(route)
}

/// Forwarding tree from `source` spanning `target` and, if given, `second`.
///
/// With no second target (or a duplicate one) this is the single shortest
/// route. Otherwise three distance maps are computed, the meeting node is
/// chosen, and the `source -> meeting`, `meeting -> target` and
/// `meeting -> second` segments are merged. The last two are rebuilt from the
/// targets' own distance maps and reversed, so every reversed hop must exist
/// as an edge in the graph.
pub fn dual_target_path<E>(
    graph: &TransformationGraph<E>,
    source: &str,
    target: &str,
    second: Option<&str>,
) -> PathResult<ForwardingPath> {
    let second = match second {
        Some(second) if second != target => second,
        _ => {
            let route = single_target_path(graph, source, target)?;
            return Ok(ForwardingPath::from_route(source, &route));
        }
    };

    let from_source = distances(graph, source);
    let from_target = distances(graph, target);
    let from_second = distances(graph, second);

    let meeting = meeting_node(&from_source, &from_target, &from_second).ok_or_else(|| {
        PathError::PathNotFound {
            from: source.to_string(),
            to: format!("{target}, {second}"),
        }
    })?;

    let mut tree = ForwardingPath::new();
    let head = path_from_distances(graph, &from_source, source, &meeting)?;
    tree.add_route(source, &head);

    for (branch_target, dist) in [(target, &from_target), (second, &from_second)] {
        let branch = reversed_branch(graph, dist, branch_target, &meeting)?;
        tree.add_route(&meeting, &branch);
    }

    Ok(tree)
}

/// Node minimizing the summed distance over three maps; smallest id wins ties.
fn meeting_node(a: &Distances, b: &Distances, c: &Distances) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;

    for (node, da) in a {
        let (Some(db), Some(dc)) = (b.get(node), c.get(node)) else {
            continue;
        };
        let total = da + db + dc;
        if best.map_or(true, |(best_total, _)| total < best_total) {
            best = Some((total, node));
        }
    }

    best.map(|(_, node)| node.to_string())
}

/// Route `meeting -> target`, obtained by reversing `target -> meeting`.
fn reversed_branch<E>(
    graph: &TransformationGraph<E>,
    dist: &Distances,
    target: &str,
    meeting: &str,
) -> PathResult<Vec<String>> {
    let toward_meeting = path_from_distances(graph, dist, target, meeting)?;

    let mut nodes: Vec<String> = std::iter::once(target.to_string())
        .chain(toward_meeting)
        .collect();
    nodes.reverse();

    let traversable = nodes.windows(2).all(|w| graph.contains_edge(&w[0], &w[1]));
    if !traversable {
        return Err(PathError::PathNotFound {
            from: meeting.to_string(),
            to: target.to_string(),
        });
    }

    // Drop the meeting node itself; the route lists hops after the start.
    nodes.remove(0);
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HsEdge;

    fn edge(kind: &str, name: &str, direction: f64) -> HsEdge {
        HsEdge {
            kind: kind.to_string(),
            name: name.to_string(),
            direction,
        }
    }

    // hs1---hs2---------hs3
    //        |           |
    //       hs4   hs5   hs6
    //         \    |    /
    //          \--hs7--/
    //
    // hs5 -> hs7 and hs7 -> hs5 both exist; every other pair is symmetric too.
    fn height_graph() -> TransformationGraph<HsEdge> {
        [
            ("hs1", "hs2", edge("plane", "ptr12", 1.0)),
            ("hs2", "hs1", edge("plane", "ptr12", -1.0)),
            ("hs2", "hs3", edge("grid", "gtr23", 1.0)),
            ("hs2", "hs4", edge("plane", "ptr24", 1.0)),
            ("hs3", "hs2", edge("grid", "gtr23", -1.0)),
            ("hs3", "hs6", edge("plane", "ptr36", 1.0)),
            ("hs4", "hs2", edge("plane", "ptr24", -1.0)),
            ("hs4", "hs7", edge("plane", "ptr47", 1.0)),
            ("hs5", "hs7", edge("plane", "ptr57", 1.0)),
            ("hs6", "hs3", edge("plane", "ptr36", -1.0)),
            ("hs6", "hs7", edge("grid", "gtr67", 1.0)),
            ("hs7", "hs4", edge("plane", "ptr47", -1.0)),
            ("hs7", "hs5", edge("grid", "gtr57", -1.0)),
            ("hs7", "hs6", edge("grid", "gtr67", -1.0)),
        ]
        .into_iter()
        .collect()
    }

    fn route(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn tree(entries: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        entries
            .iter()
            .map(|(from, to)| {
                (
                    from.to_string(),
                    to.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect()
    }

    /// Plain BFS over an adjacency list, used as the reference.
    fn reference_distance(graph: &TransformationGraph<HsEdge>, from: &str, to: &str) -> Option<usize> {
        let mut frontier = vec![from.to_string()];
        let mut seen = BTreeSet::from([from.to_string()]);
        let mut depth = 0;
        while !frontier.is_empty() {
            if frontier.iter().any(|n| n == to) {
                return Some(depth);
            }
            let mut next = Vec::new();
            for node in &frontier {
                for n in graph.neighbors(node) {
                    if seen.insert(n.to_string()) {
                        next.push(n.to_string());
                    }
                }
            }
            frontier = next;
            depth += 1;
        }
        None
    }

    #[test]
    fn test_distances_from_hs1() {
        let dist = distances(&height_graph(), "hs1");
        let expected = [
            ("hs1", 0),
            ("hs2", 1),
            ("hs3", 2),
            ("hs4", 2),
            ("hs6", 3),
            ("hs7", 3),
            ("hs5", 4),
        ];
        for (node, d) in expected {
            assert_eq!(dist[node], d, "distance hs1 -> {node}");
        }
    }

    #[test]
    fn test_distances_from_every_node() {
        let cases: &[(&str, &[(&str, usize)])] = &[
            ("hs2", &[("hs1", 1), ("hs3", 1), ("hs4", 1), ("hs6", 2), ("hs7", 2), ("hs5", 3)]),
            ("hs3", &[("hs2", 1), ("hs6", 1), ("hs1", 2), ("hs4", 2), ("hs7", 2), ("hs5", 3)]),
            ("hs4", &[("hs2", 1), ("hs7", 1), ("hs1", 2), ("hs3", 2), ("hs5", 2), ("hs6", 2)]),
            ("hs5", &[("hs7", 1), ("hs4", 2), ("hs6", 2), ("hs2", 3), ("hs3", 3), ("hs1", 4)]),
            ("hs6", &[("hs3", 1), ("hs7", 1), ("hs2", 2), ("hs4", 2), ("hs5", 2), ("hs1", 3)]),
            ("hs7", &[("hs4", 1), ("hs5", 1), ("hs6", 1), ("hs2", 2), ("hs3", 2), ("hs1", 3)]),
        ];

        let graph = height_graph();
        for (source, expected) in cases {
            let dist = distances(&graph, source);
            for (node, d) in expected.iter() {
                assert_eq!(dist[*node], *d, "distance {source} -> {node}");
            }
        }
    }

    #[test]
    fn test_distances_match_reference_bfs() {
        let graph = height_graph();
        for source in graph.nodes() {
            let dist = distances(&graph, source);
            for target in graph.nodes() {
                assert_eq!(
                    dist.get(target).copied(),
                    reference_distance(&graph, source, target),
                    "{source} -> {target}"
                );
            }
        }
    }

    #[test]
    fn test_unreachable_nodes_absent() {
        let graph: TransformationGraph<()> = [("a", "b", ())].into_iter().collect();
        let dist = distances(&graph, "b");
        assert_eq!(dist.len(), 1);
        assert!(!dist.contains_key("a"));
    }

    #[test]
    fn test_single_target_paths() {
        let cases: &[(&str, &str, &[&str])] = &[
            ("hs1", "hs1", &[]),
            ("hs1", "hs2", &["hs2"]),
            ("hs1", "hs3", &["hs2", "hs3"]),
            ("hs1", "hs4", &["hs2", "hs4"]),
            ("hs1", "hs5", &["hs2", "hs4", "hs7", "hs5"]),
            ("hs1", "hs6", &["hs2", "hs3", "hs6"]),
            ("hs1", "hs7", &["hs2", "hs4", "hs7"]),
            ("hs3", "hs1", &["hs2", "hs1"]),
            ("hs3", "hs2", &["hs2"]),
            ("hs3", "hs4", &["hs2", "hs4"]),
            ("hs3", "hs5", &["hs6", "hs7", "hs5"]),
            ("hs3", "hs6", &["hs6"]),
            ("hs3", "hs7", &["hs6", "hs7"]),
            ("hs7", "hs1", &["hs4", "hs2", "hs1"]),
            ("hs7", "hs2", &["hs4", "hs2"]),
            ("hs7", "hs3", &["hs6", "hs3"]),
            ("hs7", "hs4", &["hs4"]),
            ("hs7", "hs5", &["hs5"]),
            ("hs7", "hs6", &["hs6"]),
        ];

        let graph = height_graph();
        for (start, target, expected) in cases {
            let path = single_target_path(&graph, start, target).unwrap();
            assert_eq!(path, route(expected), "{start} -> {target}");
        }
    }

    #[test]
    fn test_path_length_equals_hop_count() {
        let graph = height_graph();
        for source in graph.nodes() {
            let dist = distances(&graph, source);
            for (target, hops) in &dist {
                let path = single_target_path(&graph, source, target).unwrap();
                assert_eq!(path.len(), *hops);
            }
        }
    }

    #[test]
    fn test_tie_break_prefers_smallest_id() {
        // Two equal routes a -> {b, c} -> d.
        let graph: TransformationGraph<()> = [("a", "c", ()), ("a", "b", ()), ("c", "d", ()), ("b", "d", ())]
            .into_iter()
            .collect();
        let path = single_target_path(&graph, "a", "d").unwrap();
        assert_eq!(path, route(&["b", "d"]));
    }

    #[test]
    fn test_unreachable_target_fails() {
        let graph: TransformationGraph<()> = [("a", "b", ())].into_iter().collect();
        let err = single_target_path(&graph, "b", "a").unwrap_err();
        assert_eq!(
            err,
            PathError::PathNotFound {
                from: "b".into(),
                to: "a".into()
            }
        );
        assert!(single_target_path(&graph, "a", "zzz").is_err());
    }

    #[test]
    fn test_forwarding_trees() {
        let cases: &[(&str, &str, Option<&str>, &[(&str, &[&str])])] = &[
            ("hs1", "hs1", None, &[]),
            ("hs1", "hs2", None, &[("hs1", &["hs2"])]),
            ("hs1", "hs6", None, &[("hs1", &["hs2"]), ("hs2", &["hs3"]), ("hs3", &["hs6"])]),
            (
                "hs1",
                "hs5",
                None,
                &[("hs1", &["hs2"]), ("hs2", &["hs4"]), ("hs4", &["hs7"]), ("hs7", &["hs5"])],
            ),
            ("hs6", "hs4", None, &[("hs6", &["hs7"]), ("hs7", &["hs4"])]),
            ("hs1", "hs2", Some("hs3"), &[("hs1", &["hs2"]), ("hs2", &["hs3"])]),
            (
                "hs1",
                "hs2",
                Some("hs5"),
                &[("hs1", &["hs2"]), ("hs2", &["hs4"]), ("hs4", &["hs7"]), ("hs7", &["hs5"])],
            ),
            (
                "hs1",
                "hs7",
                Some("hs6"),
                &[("hs1", &["hs2"]), ("hs2", &["hs3"]), ("hs3", &["hs6"]), ("hs6", &["hs7"])],
            ),
            ("hs1", "hs3", Some("hs4"), &[("hs1", &["hs2"]), ("hs2", &["hs3", "hs4"])]),
            (
                "hs1",
                "hs4",
                Some("hs5"),
                &[("hs1", &["hs2"]), ("hs2", &["hs4"]), ("hs4", &["hs7"]), ("hs7", &["hs5"])],
            ),
            (
                "hs4",
                "hs5",
                Some("hs3"),
                &[("hs4", &["hs2", "hs7"]), ("hs7", &["hs5"]), ("hs2", &["hs3"])],
            ),
            ("hs2", "hs2", Some("hs3"), &[("hs2", &["hs3"])]),
        ];

        let graph = height_graph();
        for (start, target, second, expected) in cases {
            let path = dual_target_path(&graph, start, target, *second).unwrap();
            assert_eq!(
                path.as_map(),
                &tree(expected),
                "{start} -> {target}, {second:?}"
            );
        }
    }

    #[test]
    fn test_swapping_targets_keeps_edges() {
        let graph = height_graph();
        let nodes = graph.nodes();
        for source in &nodes {
            for t1 in &nodes {
                for t2 in &nodes {
                    let a = dual_target_path(&graph, source, t1, Some(*t2)).unwrap();
                    let b = dual_target_path(&graph, source, t2, Some(*t1)).unwrap();
                    assert_eq!(a, b, "{source} -> {t1}, {t2}");
                }
            }
        }
    }

    #[test]
    fn test_tree_spans_source_and_targets() {
        let graph = height_graph();
        let nodes = graph.nodes();
        for source in &nodes {
            for t1 in &nodes {
                for t2 in &nodes {
                    let path = dual_target_path(&graph, source, t1, Some(*t2)).unwrap();
                    if source == t1 && source == t2 {
                        assert!(path.is_empty());
                        continue;
                    }
                    for node in [source, t1, t2] {
                        assert!(path.contains(node), "{node} missing in {source} -> {t1}, {t2}");
                    }
                    for (from, to) in path.edges() {
                        assert!(graph.contains_edge(from, to));
                    }
                }
            }
        }
    }

    #[test]
    fn test_dual_target_unreachable() {
        let graph: TransformationGraph<()> = [("a", "b", ()), ("b", "a", ()), ("c", "c2", ())]
            .into_iter()
            .collect();
        assert!(dual_target_path(&graph, "a", "b", Some("c")).is_err());
    }

    #[test]
    fn test_dual_target_rejects_one_way_branch() {
        // The meeting node is "a"; the branch to "c" only exists as c -> a.
        let graph: TransformationGraph<()> = [("a", "b", ()), ("b", "a", ()), ("c", "a", ())]
            .into_iter()
            .collect();
        let err = dual_target_path(&graph, "a", "b", Some("c")).unwrap_err();
        assert!(matches!(err, PathError::PathNotFound { .. }));
    }
}
