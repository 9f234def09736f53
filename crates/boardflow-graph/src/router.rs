use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use boardflow_core::config::ModelConfig;
use boardflow_core::error::{BoardflowError, Result};
use boardflow_core::traits::LlmClient;
use boardflow_core::types::{ChatMessage, ResultKind, TokenUsage, WorkerKind};

use crate::model::BoardNode;
use crate::pipeline::drain_collect;

const ROUTER_INSTRUCTION: &str = "You are a routing supervisor. Your only job is to \
choose between the text worker and the vision worker for one node. Rules: if the node \
payload carries a non-empty imageUrl, choose vision; otherwise choose between text and \
vision from the payload text and predecessor outputs. Do not perform the task yourself, \
do not call tools, and do not output anything except strict JSON: {\"used\":\"text\"} \
or {\"used\":\"vision\"}. Choose exactly one worker.";

/// A direct predecessor's outcome, as shown to the router and workers.
#[derive(Debug, Clone, Serialize)]
pub struct PredecessorOutput {
    pub id: String,
    pub kind: ResultKind,
    pub output: String,
}

/// What the routing stage produced for one node.
///
/// Usage is reported even when the decision failed — the tokens were
/// still spent.
pub struct RouteOutcome {
    pub decision: Result<WorkerKind>,
    pub usage: TokenUsage,
}

/// The routing capability: asks an LLM which worker should handle a node.
///
/// Its judgment is advisory — the pipeline applies hard overrides on top.
/// A failure here is never fatal to the run; the caller degrades the node
/// to a routed-error result.
pub struct Router {
    client: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl Router {
    pub fn new(client: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { client, config }
    }

    pub async fn route(
        &self,
        node: &BoardNode,
        prevs: &[PredecessorOutput],
        cancel: &CancellationToken,
    ) -> RouteOutcome {
        let query = routing_query(node, prevs);
        let messages = vec![
            ChatMessage::system(ROUTER_INSTRUCTION),
            ChatMessage::user(query),
        ];

        let opened = tokio::select! {
            _ = cancel.cancelled() => Err(BoardflowError::Cancelled),
            r = self.client.chat_stream(&self.config, messages) => r,
        };

        let mut stream = match opened {
            Ok(s) => s,
            Err(e) => {
                return RouteOutcome {
                    decision: Err(e),
                    usage: TokenUsage::default(),
                }
            }
        };

        let (text, usage, err) = drain_collect(&mut stream, None, cancel).await;
        if let Some(e) = err {
            return RouteOutcome {
                decision: Err(e),
                usage,
            };
        }

        debug!(node = %node.id, raw = %text, "Router decision received");
        RouteOutcome {
            decision: parse_decision(&text),
            usage,
        }
    }
}

/// Build the routing query: the node's own payload plus the direct
/// predecessor outcomes, serialized so the router sees exactly what the
/// worker will see.
pub fn routing_query(node: &BoardNode, prevs: &[PredecessorOutput]) -> String {
    let prev_json = serde_json::to_string(prevs).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Route this node; do not perform the task.\n\
         Node id: {}\n\
         Node payload (JSON): {}\n\
         Predecessor outputs (JSON): {}\n\
         Return strict JSON only: {{\"used\":\"text\"}} or {{\"used\":\"vision\"}}.",
        node.id, node.payload, prev_json
    )
}

#[derive(Deserialize)]
struct Decision {
    used: String,
}

/// Parse the router's decision out of its raw response.
///
/// Models wrap the JSON in prose or code fences often enough that a
/// strict parse alone loses nodes; scan for the embedded object before
/// giving up, then fall back to bare worker names.
pub fn parse_decision(raw: &str) -> Result<WorkerKind> {
    let trimmed = raw.trim();

    if let Ok(d) = serde_json::from_str::<Decision>(trimmed) {
        return kind_from_name(&d.used, trimmed);
    }

    if let Some(start) = trimmed.find('{') {
        if let Some(len) = trimmed[start..].find('}') {
            if let Ok(d) = serde_json::from_str::<Decision>(&trimmed[start..=start + len]) {
                return kind_from_name(&d.used, trimmed);
            }
        }
    }

    let lower = trimmed.to_lowercase();
    if lower.contains("vision") {
        return Ok(WorkerKind::Vision);
    }
    if lower.contains("text") {
        return Ok(WorkerKind::Text);
    }

    Err(BoardflowError::RouteDecision(format!(
        "no worker named in response: {:?}",
        truncate(trimmed, 120)
    )))
}

fn kind_from_name(name: &str, raw: &str) -> Result<WorkerKind> {
    match name {
        "text" => Ok(WorkerKind::Text),
        "vision" => Ok(WorkerKind::Vision),
        other => Err(BoardflowError::RouteDecision(format!(
            "unknown worker {:?} in response: {:?}",
            other,
            truncate(raw, 120)
        ))),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
