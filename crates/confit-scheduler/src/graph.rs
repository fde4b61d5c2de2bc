//! Dependency graph of a set of configs.
//!
//! Edges point from a referenced config to the config referencing it, so the
//! successors of a node are the configs that must wait for it.

use confit_core::{ConfigObject, Coordinate, Error, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Config -> configs it references.
    predecessors: BTreeMap<Coordinate, BTreeSet<Coordinate>>,
    /// Config -> configs referencing it.
    successors: BTreeMap<Coordinate, BTreeSet<Coordinate>>,
    /// Config -> referenced coordinates that are not part of the set.
    unknown_references: BTreeMap<Coordinate, Vec<Coordinate>>,
}

impl DependencyGraph {
    /// Build the graph and verify it is acyclic.
    ///
    /// A cycle fails with [`Error::CyclicDependency`] naming every config on
    /// a cycle. References to configs outside the set are not edges; they are
    /// kept in [`unknown_references`](Self::unknown_references) and fail only
    /// the referencing config at deploy time.
    pub fn build(objects: &[ConfigObject]) -> Result<Self> {
        let mut graph = Self::default();

        for object in objects {
            if graph.predecessors.contains_key(&object.coordinate) {
                warn!(coordinate = %object.coordinate, "Ignoring duplicate config");
                continue;
            }
            graph
                .predecessors
                .insert(object.coordinate.clone(), BTreeSet::new());
            graph
                .successors
                .insert(object.coordinate.clone(), BTreeSet::new());
        }

        let mut seen = BTreeSet::new();
        for object in objects {
            if !seen.insert(&object.coordinate) {
                continue;
            }
            for target in object.references() {
                if graph.predecessors.contains_key(&target) {
                    if let Some(succ) = graph.successors.get_mut(&target) {
                        succ.insert(object.coordinate.clone());
                    }
                    if let Some(pred) = graph.predecessors.get_mut(&object.coordinate) {
                        pred.insert(target);
                    }
                } else {
                    graph
                        .unknown_references
                        .entry(object.coordinate.clone())
                        .or_default()
                        .push(target);
                }
            }
        }

        let cycles = graph.find_cycles();
        if !cycles.is_empty() {
            return Err(Error::CyclicDependency { cycles });
        }

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.predecessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predecessors.is_empty()
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.predecessors.contains_key(coordinate)
    }

    /// All configs in coordinate order.
    pub fn nodes(&self) -> impl Iterator<Item = &Coordinate> {
        self.predecessors.keys()
    }

    /// Configs referenced by `coordinate`.
    pub fn predecessors(&self, coordinate: &Coordinate) -> impl Iterator<Item = &Coordinate> {
        self.predecessors.get(coordinate).into_iter().flatten()
    }

    /// Configs referencing `coordinate`.
    pub fn successors(&self, coordinate: &Coordinate) -> impl Iterator<Item = &Coordinate> {
        self.successors.get(coordinate).into_iter().flatten()
    }

    /// Referenced coordinates of `coordinate` that are not in the graph.
    pub fn unknown_references(&self, coordinate: &Coordinate) -> &[Coordinate] {
        self.unknown_references
            .get(coordinate)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every transitive successor of `coordinate`, excluding itself.
    pub fn descendants(&self, coordinate: &Coordinate) -> BTreeSet<Coordinate> {
        let mut found = BTreeSet::new();
        let mut queue: VecDeque<&Coordinate> = self.successors(coordinate).collect();
        while let Some(next) = queue.pop_front() {
            if found.insert(next.clone()) {
                queue.extend(self.successors(next));
            }
        }
        found
    }

    /// Topological layers (Kahn's algorithm): every config appears in the
    /// first layer after all of its predecessors. Layers are in coordinate
    /// order.
    pub fn layers(&self) -> Vec<Vec<Coordinate>> {
        let mut in_degree: BTreeMap<&Coordinate, usize> = self
            .predecessors
            .iter()
            .map(|(node, preds)| (node, preds.len()))
            .collect();

        let mut current: Vec<&Coordinate> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut layers = Vec::new();
        while !current.is_empty() {
            let mut next = BTreeSet::new();
            for node in &current {
                for succ in self.successors(node) {
                    if let Some(deg) = in_degree.get_mut(succ) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            next.insert(succ);
                        }
                    }
                }
            }
            layers.push(current.into_iter().cloned().collect());
            current = next.into_iter().collect();
        }
        layers
    }

    /// One cycle per group of configs on a cycle, each listed in edge order.
    /// Every config that lies on any cycle appears in at least one of them.
    fn find_cycles(&self) -> Vec<Vec<Coordinate>> {
        let mut covered = BTreeSet::new();
        let mut cycles = Vec::new();

        for node in self.nodes() {
            if covered.contains(node) {
                continue;
            }
            if let Some(cycle) = self.shortest_cycle_through(node) {
                covered.extend(cycle.iter().cloned());
                cycles.push(cycle);
            }
        }
        cycles
    }

    /// Breadth-first search from `start` back to itself over successor edges.
    fn shortest_cycle_through(&self, start: &Coordinate) -> Option<Vec<Coordinate>> {
        let mut parent: BTreeMap<&Coordinate, &Coordinate> = BTreeMap::new();
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for succ in self.successors(node) {
                if succ == start {
                    let mut path = vec![node.clone()];
                    let mut cursor = node;
                    while cursor != start {
                        cursor = parent[cursor];
                        path.push(cursor.clone());
                    }
                    path.reverse();
                    return Some(path);
                }
                if !parent.contains_key(succ) {
                    parent.insert(succ, node);
                    queue.push_back(succ);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confit_core::{Parameter, RemoteType};

    fn coord(id: &str) -> Coordinate {
        Coordinate::new("p", "dashboard", id)
    }

    fn config(id: &str, refs: &[&str]) -> ConfigObject {
        let mut object = ConfigObject::new(
            coord(id),
            RemoteType::Classic {
                api: "dashboard".into(),
            },
            "{}",
        );
        for (i, r) in refs.iter().enumerate() {
            object = object.with_parameter(format!("ref{i}"), Parameter::reference(coord(r), "id"));
        }
        object
    }

    #[test]
    fn test_layers() {
        let graph = DependencyGraph::build(&[
            config("c", &["a"]),
            config("a", &[]),
            config("b", &[]),
            config("d", &["b", "c"]),
        ])
        .unwrap();

        assert_eq!(
            graph.layers(),
            vec![
                vec![coord("a"), coord("b")],
                vec![coord("c")],
                vec![coord("d")]
            ]
        );
    }

    #[test]
    fn test_descendants() {
        let graph = DependencyGraph::build(&[
            config("a", &[]),
            config("b", &["a"]),
            config("c", &["b"]),
            config("x", &[]),
        ])
        .unwrap();

        let desc = graph.descendants(&coord("a"));
        assert_eq!(desc, BTreeSet::from([coord("b"), coord("c")]));
        assert!(graph.descendants(&coord("x")).is_empty());
    }

    #[test]
    fn test_cycle_names_every_member() {
        let err = DependencyGraph::build(&[
            config("a", &["c"]),
            config("b", &["a"]),
            config("c", &["b"]),
            config("free", &[]),
        ])
        .unwrap_err();

        let Error::CyclicDependency { cycles } = &err else {
            panic!("expected cycle error, got {err:?}");
        };
        let members: BTreeSet<_> = cycles.iter().flatten().cloned().collect();
        assert_eq!(members, BTreeSet::from([coord("a"), coord("b"), coord("c")]));

        let message = err.to_string();
        assert!(message.contains("p:dashboard:a"));
        assert!(!message.contains("free"));
    }

    #[test]
    fn test_cycle_reached_through_cross_edge() {
        // r -> a -> r and r -> b -> a: b lies on r -> b -> a -> r
        let err = DependencyGraph::build(&[
            config("r", &["a"]),
            config("a", &["r", "b"]),
            config("b", &["r"]),
        ])
        .unwrap_err();

        let Error::CyclicDependency { cycles } = err else {
            panic!("expected cycle error");
        };
        let members: BTreeSet<_> = cycles.into_iter().flatten().collect();
        assert_eq!(members, BTreeSet::from([coord("a"), coord("b"), coord("r")]));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let err = DependencyGraph::build(&[config("a", &["a"])]).unwrap_err();
        assert!(matches!(err, Error::CyclicDependency { cycles } if cycles == vec![vec![coord("a")]]));
    }

    #[test]
    fn test_unknown_reference_is_not_an_edge() {
        let graph = DependencyGraph::build(&[config("a", &["missing"])]).unwrap();
        assert_eq!(graph.unknown_references(&coord("a")), &[coord("missing")]);
        assert_eq!(graph.layers(), vec![vec![coord("a")]]);
    }

    #[test]
    fn test_duplicate_config_ignored() {
        let graph = DependencyGraph::build(&[config("a", &[]), config("a", &["b"])]).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.unknown_references(&coord("a")).is_empty());
    }
}
