use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::{ChatMessage, StreamDelta};

/// LLM capability — the boundary both the router and the workers sit behind.
///
/// A call yields a lazily-produced sequence of deltas terminated by
/// `StreamDelta::Stop`, with usage counters delivered as a typed
/// `StreamDelta::Usage` chunk. Any error, at open or mid-stream, is
/// recoverable at node granularity by the caller.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}
