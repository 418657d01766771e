//! Class hierarchy as an explicit directed relation.
//!
//! Uses `petgraph::DiGraph` with:
//! - Nodes: class hashes
//! - Edges: derived -> base, weighted by the upcast projection that finds
//!   the base sub-object inside a derived object

use std::collections::VecDeque;

use hostbridge_core::{MemberProjection, TypeHash};
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;

/// Directed derived-to-base relation between registered classes.
#[derive(Default)]
pub struct ClassHierarchy {
    graph: DiGraph<TypeHash, MemberProjection>,
    nodes: FxHashMap<TypeHash, NodeIndex>,
}

impl ClassHierarchy {
    /// Create an empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class node (idempotent).
    pub fn add_class(&mut self, class: TypeHash) -> NodeIndex {
        if let Some(node) = self.nodes.get(&class) {
            return *node;
        }
        let node = self.graph.add_node(class);
        self.nodes.insert(class, node);
        node
    }

    /// Record that `derived` embeds `base`, reachable through `upcast`.
    pub fn add_base(&mut self, derived: TypeHash, base: TypeHash, upcast: MemberProjection) {
        let from = self.add_class(derived);
        let to = self.add_class(base);
        self.graph.add_edge(from, to, upcast);
    }

    /// Direct bases of `class`.
    pub fn bases(&self, class: TypeHash) -> Vec<TypeHash> {
        let Some(node) = self.nodes.get(&class) else {
            return Vec::new();
        };
        let mut bases: Vec<(EdgeIndex, TypeHash)> = self
            .graph
            .edges_directed(*node, Direction::Outgoing)
            .map(|edge| (edge.id(), self.graph[edge.target()]))
            .collect();
        bases.sort_by_key(|(edge, _)| *edge);
        bases.into_iter().map(|(_, base)| base).collect()
    }

    /// Whether `class` is `ancestor` or derives from it.
    pub fn is_a(&self, class: TypeHash, ancestor: TypeHash) -> bool {
        class == ancestor || self.ancestors(class).contains(&ancestor)
    }

    /// All ancestors of `class`, nearest first.
    pub fn ancestors(&self, class: TypeHash) -> Vec<TypeHash> {
        let mut out = Vec::new();
        let mut queue: VecDeque<TypeHash> = self.bases(class).into();
        while let Some(next) = queue.pop_front() {
            if next == class || out.contains(&next) {
                continue;
            }
            out.push(next);
            queue.extend(self.bases(next));
        }
        out
    }

    /// Upcast steps that turn a `from` object into its `to` sub-object.
    ///
    /// Empty when `from == to`; `None` when `to` is not an ancestor.
    pub fn upcast_path(&self, from: TypeHash, to: TypeHash) -> Option<Vec<MemberProjection>> {
        if from == to {
            return Some(Vec::new());
        }
        let start = *self.nodes.get(&from)?;
        let goal = *self.nodes.get(&to)?;

        let mut came_from: FxHashMap<NodeIndex, EdgeIndex> = FxHashMap::default();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if node == goal {
                let mut path = Vec::new();
                let mut current = goal;
                while current != start {
                    let edge = *came_from.get(&current)?;
                    path.push(self.graph[edge].clone());
                    current = self.graph.edge_endpoints(edge)?.0;
                }
                path.reverse();
                return Some(path);
            }
            let mut edges: Vec<_> = self
                .graph
                .edges_directed(node, Direction::Outgoing)
                .map(|edge| (edge.id(), edge.target()))
                .collect();
            edges.sort_by_key(|(edge, _)| *edge);
            for (edge, next) in edges {
                if next != start && !came_from.contains_key(&next) {
                    came_from.insert(next, edge);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Number of classes in the hierarchy.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if the hierarchy has no classes.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

impl std::fmt::Debug for ClassHierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassHierarchy")
            .field("classes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}
