//! Scripted capability mock: a deterministic `LlmClient` for executor and
//! printer tests. Responses are keyed by model id, so a single client can
//! play the router and both workers in one test.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use boardflow_core::config::ModelConfig;
use boardflow_core::error::{BoardflowError, Result};
use boardflow_core::traits::LlmClient;
use boardflow_core::types::{ChatMessage, StopReason, StreamDelta, TokenUsage};

/// One canned capability response.
#[derive(Debug, Clone, Default)]
pub struct CannedResponse {
    /// Text increments, streamed one delta per entry.
    pub chunks: Vec<String>,
    /// Usage chunk attached to the end of the stream.
    pub usage: Option<TokenUsage>,
    /// Fail before any delta is produced (request-level fault).
    pub fail_open: Option<String>,
    /// Fail mid-stream after the chunks (stream-level fault).
    pub fail_mid: Option<String>,
    /// Never finish after the chunks; resolves only via cancellation.
    pub stall: bool,
}

impl CannedResponse {
    pub fn text(content: &str) -> Self {
        Self {
            chunks: vec![content.to_string()],
            ..Self::default()
        }
    }

    pub fn chunked(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, prompt: u64, completion: u64) -> Self {
        self.usage = Some(TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        });
        self
    }

    pub fn request_error(message: &str) -> Self {
        Self {
            fail_open: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn stream_error(message: &str) -> Self {
        Self {
            fail_mid: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Stream the given chunks and then hang until the caller cancels.
    pub fn stalled(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            stall: true,
            ..Self::default()
        }
    }
}

/// A record of one call the scripted client served.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
}

/// Deterministic `LlmClient`: pops canned responses per model id and
/// records every call so tests can assert on the prompts that were sent.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<CannedResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the given model id. Calls pop in FIFO order;
    /// when the queue is empty the client answers with "ok".
    pub fn push(&self, model_id: &str, response: CannedResponse) {
        self.scripts
            .lock()
            .unwrap()
            .entry(model_id.to_string())
            .or_default()
            .push_back(response);
    }

    /// All calls served so far for a model id.
    pub fn calls_for(&self, model_id: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.model_id == model_id)
            .cloned()
            .collect()
    }

    /// Concatenated user-message content of one recorded call.
    pub fn user_prompt(call: &RecordedCall) -> String {
        call.messages
            .iter()
            .filter(|m| matches!(m.role, boardflow_core::types::Role::User))
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl LlmClient for ScriptedClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let model_id = config.model_id.clone();

        Box::pin(async move {
            self.calls.lock().unwrap().push(RecordedCall {
                model_id: model_id.clone(),
                messages,
            });

            let response = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&model_id)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| CannedResponse::text("ok"));

            if let Some(msg) = response.fail_open {
                return Err(BoardflowError::LlmRequest(msg));
            }

            let mut deltas: Vec<Result<StreamDelta>> = response
                .chunks
                .into_iter()
                .map(|c| Ok(StreamDelta::TextDelta(c)))
                .collect();
            if let Some(msg) = response.fail_mid {
                deltas.push(Err(BoardflowError::LlmStream(msg)));
            }
            if let Some(usage) = response.usage {
                deltas.push(Ok(StreamDelta::Usage(usage)));
            }
            if !response.stall {
                deltas.push(Ok(StreamDelta::Stop(StopReason::EndTurn)));
            }
            let stall = response.stall;

            // Yield between deltas so concurrent pipelines genuinely
            // interleave in tests.
            let stream = futures::stream::unfold(
                (deltas.into_iter(), stall),
                |(mut it, stall)| async move {
                    tokio::task::yield_now().await;
                    match it.next() {
                        Some(d) => Some((d, (it, stall))),
                        None if stall => {
                            futures::future::pending::<()>().await;
                            None
                        }
                        None => None,
                    }
                },
            );

            Ok(Box::pin(stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

/// A `Write` handle over a shared buffer so tests can read back what a
/// printer emitted.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap_or_default()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
