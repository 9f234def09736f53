use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use boardflow_core::config::ModelConfig;
use boardflow_core::error::{BoardflowError, Result};
use boardflow_core::traits::LlmClient;
use boardflow_core::types::{ChatMessage, NodeResult, StreamDelta, TokenUsage, WorkerKind};

use crate::model::{Board, BoardNode};
use crate::printer::{PrinterBlock, StreamPrinter};
use crate::router::{PredecessorOutput, Router};
use crate::store::{ProcessedSet, ResultStore};

const TEXT_WORKER_INSTRUCTION: &str = "You are a text analysis worker. Purpose: understand \
the node content, distill the key points, and extend them briefly. Rules: with no \
predecessor outputs, reason from the node payload alone; with predecessor outputs, relate \
them to the current payload. Answer concisely, bullet points where it helps.";

const VISION_WORKER_INSTRUCTION: &str = "You are an image analysis worker. Purpose: describe \
the content behind the node's image link. Rules: with no predecessor outputs, reason from \
the node payload and image alone; with predecessor outputs, relate the image to them. \
Answer concisely.";

/// The two worker capabilities a node can be routed to, each with its own
/// model configuration.
pub struct Workers {
    pub text: (Arc<dyn LlmClient>, ModelConfig),
    pub vision: (Arc<dyn LlmClient>, ModelConfig),
}

impl Workers {
    fn select(&self, kind: WorkerKind) -> (&Arc<dyn LlmClient>, &ModelConfig) {
        match kind {
            WorkerKind::Text => (&self.text.0, &self.text.1),
            WorkerKind::Vision => (&self.vision.0, &self.vision.1),
        }
    }
}

/// Everything one run shares across its node pipelines. Constructed fresh
/// per run by the runner; nothing here outlives the run.
pub(crate) struct ExecCtx {
    pub board: Board,
    pub board_json: String,
    pub router: Router,
    pub workers: Workers,
    pub store: ResultStore,
    pub processed: ProcessedSet,
    pub printer: StreamPrinter,
    pub cancel: CancellationToken,
    pub verbose: bool,
}

/// Execute one node end to end and record its outcome.
///
/// Never returns an error: router and worker faults degrade to node-local
/// result values so siblings and descendants keep going, and the node is
/// always marked processed so layer advancement is never blocked.
pub(crate) async fn execute_node(
    ctx: &ExecCtx,
    node_id: &str,
    predecessors: &[String],
    is_terminal: bool,
) {
    let Some(node) = ctx.board.node(node_id) else {
        return;
    };

    // 1) Predecessor outcomes, in edge order; entries not yet present are
    //    skipped (cannot happen when scheduling order is respected).
    let prevs = ctx.store.gather(predecessors);
    let prev_ids: Vec<&str> = prevs.iter().map(|p| p.id.as_str()).collect();
    info!(node = %node.id, direct_predecessors = ?prev_ids, "Executing board node");

    // 2) Advisory routing decision.
    let route = ctx.router.route(node, &prevs, &ctx.cancel).await;
    let routed = match route.decision {
        Ok(kind) => kind,
        Err(e) => {
            // Routing failure bounds to this node: degraded result,
            // still processed, downstream proceeds.
            warn!(node = %node.id, error = %e, "Routing failed, recording degraded result");
            ctx.store.insert(
                node_id,
                NodeResult::routed_error(e.to_string()).with_router_usage(route.usage),
            );
            ctx.processed.mark(node_id);
            return;
        }
    };

    // 3) Hard overrides on top of the router's judgment: the terminal
    //    rule fires first and forces text; the image rule only applies to
    //    non-terminal nodes and forces vision.
    let image_url = node.image_url();
    let kind = if is_terminal {
        WorkerKind::Text
    } else if image_url.is_some() {
        WorkerKind::Vision
    } else {
        routed
    };
    if kind != routed {
        debug!(node = %node.id, routed = %routed, forced = %kind, "Router decision overridden");
    }

    // 4) Compose the worker context and invoke the selected worker,
    //    streaming its output through an exclusive printer block.
    let image_for_prompt = if kind == WorkerKind::Vision {
        image_url
    } else {
        None
    };
    let prompt = compose_prompt(node, &prevs, is_terminal, image_for_prompt, &ctx.board_json);
    let instruction = match kind {
        WorkerKind::Text => TEXT_WORKER_INSTRUCTION,
        WorkerKind::Vision => VISION_WORKER_INSTRUCTION,
    };
    let messages = vec![ChatMessage::system(instruction), ChatMessage::user(prompt)];

    let (client, config) = ctx.workers.select(kind);
    let opened = tokio::select! {
        _ = ctx.cancel.cancelled() => Err(BoardflowError::Cancelled),
        r = client.chat_stream(config, messages) => r,
    };

    let result = match opened {
        Err(e) => {
            warn!(node = %node.id, worker = %kind, error = %e, "Worker call failed");
            NodeResult::from_worker(kind, String::new(), Some(e.to_string()))
        }
        Ok(mut stream) => {
            let mut block = ctx.printer.begin(node_id).await;
            let (text, usage, err) =
                drain_collect(&mut stream, Some(&mut block), &ctx.cancel).await;
            drop(block);

            if ctx.verbose {
                info!(node = %node.id, worker = %kind, chars = text.len(), "Worker stream drained");
            }

            if !usage.is_zero() {
                info!(
                    node = %node.id,
                    kind = %kind,
                    prompt = usage.prompt_tokens,
                    completion = usage.completion_tokens,
                    total = usage.total_tokens,
                    "Worker token usage"
                );
            }
            match err {
                Some(e) => {
                    warn!(node = %node.id, worker = %kind, error = %e, "Worker stream failed");
                    NodeResult::from_worker(kind, String::new(), Some(e.to_string()))
                        .with_worker_usage(usage)
                }
                None => NodeResult::from_worker(kind, text.trim().to_string(), None)
                    .with_worker_usage(usage),
            }
        }
    };

    // 5) Record: router-stage usage is kept even when the worker failed.
    if !route.usage.is_zero() {
        info!(
            node = %node.id,
            prompt = route.usage.prompt_tokens,
            completion = route.usage.completion_tokens,
            total = route.usage.total_tokens,
            "Router token usage"
        );
    }
    ctx.store.insert(node_id, result.with_router_usage(route.usage));
    ctx.processed.mark(node_id);
}

/// Consume a capability stream to completion or cancellation, collecting
/// text and usage. Increments are forwarded to the printer block when one
/// is attached. Mid-stream errors are kept (first one wins) while the
/// rest of the stream is drained for its usage chunk.
pub(crate) async fn drain_collect(
    stream: &mut BoxStream<'_, Result<StreamDelta>>,
    mut block: Option<&mut PrinterBlock>,
    cancel: &CancellationToken,
) -> (String, TokenUsage, Option<BoardflowError>) {
    let mut text = String::new();
    let mut usage = TokenUsage::default();
    let mut first_err: Option<BoardflowError> = None;

    loop {
        let delta = tokio::select! {
            _ = cancel.cancelled() => {
                first_err.get_or_insert(BoardflowError::Cancelled);
                break;
            }
            d = stream.next() => d,
        };
        match delta {
            None => break,
            Some(Ok(StreamDelta::TextDelta(chunk))) => {
                if let Some(b) = block.as_deref_mut() {
                    b.write_chunk(&chunk);
                }
                text.push_str(&chunk);
            }
            Some(Ok(StreamDelta::Usage(u))) => usage = u,
            Some(Ok(StreamDelta::Stop(_))) => {}
            Some(Err(e)) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }

    (text, usage, first_err)
}

/// Compose the worker context for a node. The framing differs by node
/// class: payload-only for sources, integrate-predecessors for interior
/// nodes, and final-summary with the serialized full board for terminal
/// nodes.
pub fn compose_prompt(
    node: &BoardNode,
    prevs: &[PredecessorOutput],
    is_terminal: bool,
    image_url: Option<&str>,
    board_json: &str,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Processing node: {}\n", node.id));

    out.push_str("\n## Role and purpose\n");
    if is_terminal {
        out.push_str(
            "You are the final-node summary agent: combine the direct predecessor outputs \
             with the full board payload to produce the overall summary, recommendations, \
             and the final deliverable the user asked for.\n",
        );
    } else if prevs.is_empty() {
        out.push_str(
            "You are a first-node analysis agent: reason from the current node payload only.\n",
        );
    } else {
        out.push_str(
            "You are an intermediate-node analysis agent: integrate the listed direct \
             predecessor outputs with the current payload; do not reference nodes that are \
             not listed.\n",
        );
    }

    out.push_str("\n# Predecessor outputs\n");
    if prevs.is_empty() {
        out.push_str("none\n");
    } else {
        for p in prevs {
            out.push_str(&format!("- {} ({}): {}\n", p.id, p.kind, p.output.trim()));
        }
    }

    out.push_str(&format!("\n# Current node payload (JSON)\n{}\n", node.payload));

    if is_terminal {
        out.push_str(&format!("\n# Full board (JSON)\n{}\n", board_json));
    }

    out.push_str("\n## Output requirements\n");
    if is_terminal {
        out.push_str(
            "- Start with an overall summary (no more than 10 sentences)\n\
             - Then give 3 actionable recommendations (numbered 1-3)\n\
             - End with \"Final deliverable\": content that directly satisfies the user's \
             request, obeying the user's constraints exactly (e.g. length and style)\n\
             - No code fences, no extra quoting\n",
        );
    } else {
        out.push_str(
            "- Reference only the direct predecessor outputs listed above\n\
             - Combine them with the current payload (first nodes: payload only)\n\
             - Return conclusions and key points directly, concise (no more than 6 sentences)\n",
        );
    }

    // Image scenes pass the link only, never inlined data.
    if let Some(url) = image_url {
        out.push_str(&format!("\n# Image link\nURL: {}\n", url));
    }

    out
}
