use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use boardflow_core::error::{BoardflowError, Result};

/// A node in the board graph: a unique id and an opaque payload, exactly
/// as exported by the upstream board editor. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardNode {
    pub id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl BoardNode {
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// The payload's image reference, if it carries a non-empty one.
    pub fn image_url(&self) -> Option<&str> {
        match self.payload.get("imageUrl") {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

/// A directed dependency: `to` consumes the output of `from`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardEdge {
    pub from: String,
    pub to: String,
}

impl BoardEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// The immutable board graph consumed once per run.
///
/// The edge relation is expected to be acyclic. Cycles are not detected
/// here: nodes that only depend on a cycle never reach zero in-degree and
/// simply never execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub nodes: Vec<BoardNode>,
    #[serde(default)]
    pub edges: Vec<BoardEdge>,
}

impl Board {
    /// Parse a board from its JSON source. This is the only fatal error
    /// boundary: unparsable input aborts before any scheduling happens.
    pub fn from_json(source: &str) -> Result<Self> {
        let board: Board = serde_json::from_str(source)
            .map_err(|e| BoardflowError::GraphParse(e.to_string()))?;
        board.validate()
    }

    /// Structural validation: ids must be unique and non-empty; edges that
    /// name unknown nodes are dropped rather than poisoning the in-degree
    /// table (a sloppy editor export should degrade, not abort).
    fn validate(mut self) -> Result<Self> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(BoardflowError::GraphParse("node with empty id".into()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(BoardflowError::GraphParse(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }
        let known: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.edges.retain(|e| {
            let ok = known.contains(e.from.as_str()) && known.contains(e.to.as_str());
            if !ok {
                warn!(from = %e.from, to = %e.to, "Dropping edge with unknown endpoint");
            }
            ok
        });
        Ok(self)
    }

    pub fn node(&self, id: &str) -> Option<&BoardNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
