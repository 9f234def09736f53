use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use boardflow_core::config::RunConfig;
use boardflow_core::error::Result;
use boardflow_core::types::NodeResult;

use crate::model::Board;
use crate::pipeline::{self, ExecCtx, Workers};
use crate::printer::StreamPrinter;
use crate::router::Router;
use crate::schedule::LayerSchedule;
use crate::store::{ProcessedSet, ResultStore};
use crate::usage::UsageSummary;

/// Everything a run hands back to its caller. The results map is the
/// contract a CLI, HTTP handler, or test asserts against.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub results: HashMap<String, NodeResult>,
    pub usage_summary: UsageSummary,
    /// Nodes that never reached zero in-degree (cycle members or their
    /// dependents). Informational only — never an error.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unreachable: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Executes a board layer by layer.
///
/// Each layer's nodes run concurrently under a semaphore bound; a join
/// barrier closes the layer before successor in-degrees are decremented.
/// Node-local faults never abort the run — only unparsable board input
/// (upstream of this type) and caller cancellation end it early.
pub struct GraphRunner {
    board: Board,
    router: Router,
    workers: Workers,
    printer: StreamPrinter,
    run_config: RunConfig,
}

impl GraphRunner {
    pub fn new(
        board: Board,
        router: Router,
        workers: Workers,
        printer: StreamPrinter,
        run_config: RunConfig,
    ) -> Self {
        Self {
            board,
            router,
            workers,
            printer,
            run_config,
        }
    }

    /// Run the whole board to completion (or cancellation) and hand back
    /// the aggregated report. Always yields a report unless the board
    /// itself could not be serialized.
    pub async fn run(self, cancel: CancellationToken) -> Result<RunReport> {
        let started_at = Utc::now();
        let board_json = serde_json::to_string(&self.board)?;
        let mut schedule = LayerSchedule::new(&self.board);

        let ctx = Arc::new(ExecCtx {
            board: self.board,
            board_json,
            router: self.router,
            workers: self.workers,
            store: ResultStore::new(),
            processed: ProcessedSet::new(),
            printer: self.printer,
            cancel: cancel.clone(),
            verbose: self.run_config.verbose,
        });

        let max_concurrency = self.run_config.max_concurrency.max(1);
        let mut layer = schedule.initial_layer();
        let mut layer_idx = 0usize;

        while !layer.is_empty() {
            if cancel.is_cancelled() {
                info!("Run cancelled, not dispatching further layers");
                break;
            }

            let permits = max_concurrency.min(layer.len());
            debug!(layer = layer_idx, nodes = ?layer, permits, "Dispatching layer");

            let semaphore = Arc::new(Semaphore::new(permits));
            let mut tasks: JoinSet<()> = JoinSet::new();

            for id in &layer {
                let semaphore = Arc::clone(&semaphore);
                let ctx = Arc::clone(&ctx);
                let id = id.clone();
                let predecessors = schedule.predecessors(&id).to_vec();
                let is_terminal = schedule.is_terminal(&id);

                tasks.spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => return, // semaphore closed: run is tearing down
                    };
                    pipeline::execute_node(&ctx, &id, &predecessors, is_terminal).await;
                });
            }

            // Barrier: every started pipeline joins before the next layer
            // forms, cancelled or not.
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Node pipeline task panicked");
                }
            }

            let processed = ctx.processed.snapshot();
            layer = schedule.advance(&layer, &processed);
            layer_idx += 1;
        }

        let processed = ctx.processed.snapshot();
        let results = ctx.store.take_all();
        let usage_summary = UsageSummary::accumulate(results.values());

        // A cancelled run reports partial results, not starvation.
        let unreachable = if cancel.is_cancelled() {
            Vec::new()
        } else {
            let mut ids: Vec<String> = ctx
                .board
                .nodes
                .iter()
                .map(|n| n.id.clone())
                .filter(|id| !processed.contains(id))
                .collect();
            ids.sort();
            ids
        };
        if !unreachable.is_empty() {
            warn!(nodes = ?unreachable, "Nodes never reached zero in-degree (cycle or missing dependency)");
        }

        info!(
            executed = results.len(),
            unreachable = unreachable.len(),
            total_tokens = usage_summary.total_tokens,
            "Board run complete"
        );

        Ok(RunReport {
            results,
            usage_summary,
            unreachable,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
