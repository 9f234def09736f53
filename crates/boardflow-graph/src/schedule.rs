use std::collections::{HashMap, HashSet};

use crate::model::Board;

/// Kahn-style topological layering over a board.
///
/// In-degree and adjacency are built once from the edge list; between
/// layers only the in-degree table is mutated. Nodes on a cycle (or
/// depending only on one) never reach zero in-degree and never appear in
/// any layer — silent starvation by policy.
pub struct LayerSchedule {
    indegree: HashMap<String, usize>,
    adjacency: HashMap<String, Vec<String>>,
    predecessors: HashMap<String, Vec<String>>,
}

impl LayerSchedule {
    pub fn new(board: &Board) -> Self {
        let mut indegree: HashMap<String, usize> = HashMap::with_capacity(board.nodes.len());
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        let mut predecessors: HashMap<String, Vec<String>> = HashMap::new();

        // Every node starts at zero; each incoming edge bumps it once.
        for node in &board.nodes {
            indegree.insert(node.id.clone(), 0);
        }
        for edge in &board.edges {
            adjacency
                .entry(edge.from.clone())
                .or_default()
                .push(edge.to.clone());
            predecessors
                .entry(edge.to.clone())
                .or_default()
                .push(edge.from.clone());
            *indegree.entry(edge.to.clone()).or_insert(0) += 1;
        }

        Self {
            indegree,
            adjacency,
            predecessors,
        }
    }

    /// Layer 0: every node with no unresolved dependencies.
    /// Sorted for deterministic dispatch order (execution within a layer
    /// is unordered anyway).
    pub fn initial_layer(&self) -> Vec<String> {
        let mut layer: Vec<String> = self
            .indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id.clone())
            .collect();
        layer.sort();
        layer
    }

    /// Direct successors of a node.
    pub fn successors(&self, id: &str) -> &[String] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct predecessors of a node, in edge-list order.
    pub fn predecessors(&self, id: &str) -> &[String] {
        self.predecessors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A terminal node has no outgoing edges.
    pub fn is_terminal(&self, id: &str) -> bool {
        self.successors(id).is_empty()
    }

    /// Form the next layer after `layer` has executed: for every processed
    /// node in it, decrement each successor's in-degree; successors that
    /// reach exactly zero become the next layer.
    pub fn advance(&mut self, layer: &[String], processed: &HashSet<String>) -> Vec<String> {
        let mut next = Vec::new();
        for id in layer {
            if !processed.contains(id) {
                continue;
            }
            for succ in self.adjacency.get(id).cloned().unwrap_or_default() {
                if let Some(d) = self.indegree.get_mut(&succ) {
                    *d -= 1;
                    if *d == 0 {
                        next.push(succ);
                    }
                }
            }
        }
        next.sort();
        next
    }
}
