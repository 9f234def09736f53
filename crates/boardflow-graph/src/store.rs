use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use boardflow_core::types::NodeResult;

use crate::router::PredecessorOutput;

/// Shared map from node id to its outcome.
///
/// Constructed fresh per run and injected into the layer runner. Each
/// pipeline writes its own node's key exactly once; later layers read
/// predecessor entries. The lock is narrow — never held across a
/// capability call.
#[derive(Default)]
pub struct ResultStore {
    inner: Mutex<HashMap<String, NodeResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's outcome. The store owns the value from here on.
    pub fn insert(&self, id: impl Into<String>, result: NodeResult) {
        let mut map = self.inner.lock().expect("result store poisoned");
        map.insert(id.into(), result);
    }

    /// Gather the outcomes of the given predecessor ids, in order.
    /// Ids not yet present are skipped.
    pub fn gather(&self, ids: &[String]) -> Vec<PredecessorOutput> {
        let map = self.inner.lock().expect("result store poisoned");
        ids.iter()
            .filter_map(|id| {
                map.get(id).map(|r| PredecessorOutput {
                    id: id.clone(),
                    kind: r.kind,
                    output: r.output.clone(),
                })
            })
            .collect()
    }

    /// Drain the store at run end; the store is still shared at that
    /// point, but all pipelines have joined by then.
    pub fn take_all(&self) -> HashMap<String, NodeResult> {
        std::mem::take(&mut *self.inner.lock().expect("result store poisoned"))
    }
}

/// Set of node ids whose pipeline has completed (success or failure).
///
/// Gates in-degree decrement at layer-advance time. Deliberately a
/// separate lock from the result store.
#[derive(Default)]
pub struct ProcessedSet {
    inner: Mutex<HashSet<String>>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, id: impl Into<String>) {
        let mut set = self.inner.lock().expect("processed set poisoned");
        set.insert(id.into());
    }

    /// Snapshot for layer advancement.
    pub fn snapshot(&self) -> HashSet<String> {
        self.inner.lock().expect("processed set poisoned").clone()
    }
}
