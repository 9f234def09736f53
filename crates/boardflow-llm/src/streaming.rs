use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;

use boardflow_core::error::{BoardflowError, Result};

/// Incremental framer for the `data:`-delimited SSE body the
/// chat-completions endpoint streams. The endpoint only ever sends
/// `data:` lines, so comment and event-name lines are skipped outright;
/// each yielded frame is the payload of one complete event.
#[derive(Default)]
pub struct SseFramer {
    buffer: String,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed decoded bytes and extract every complete frame.
    /// Partial events stay buffered until their closing blank line arrives.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();

            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| {
                    line.strip_prefix("data: ")
                        .or_else(|| line.strip_prefix("data:"))
                })
                .collect();
            if !data.is_empty() {
                frames.push(data.join("\n"));
            }
        }

        frames
    }
}

/// Adapts a raw HTTP byte stream into a stream of SSE data frames.
///
/// Transport faults mid-body surface as `LlmStream` errors and end the
/// stream; the consumer records them against the node instead of
/// mistaking a torn connection for a complete response.
pub struct SseStream<S> {
    inner: S,
    framer: SseFramer,
    pending: VecDeque<String>,
    done: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            framer: SseFramer::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes);
                    this.pending.extend(this.framer.feed(&text));
                    // No complete frame yet: loop and poll for more bytes.
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(BoardflowError::LlmStream(e.to_string()))));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
