use std::io::Write;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes concurrently produced node output onto one shared sink.
///
/// `begin` acquires the sink lock and returns an RAII block; the lock is
/// held for the entirety of that node's output — every streamed chunk —
/// and released when the block drops, on every exit path. Coarse on
/// purpose: readability of the interleaved console/SSE output is the
/// whole point, throughput is not.
#[derive(Clone)]
pub struct StreamPrinter {
    inner: Arc<Mutex<PrinterInner>>,
    line_width: usize,
}

struct PrinterInner {
    sink: Box<dyn Write + Send>,
}

impl StreamPrinter {
    pub fn new(sink: Box<dyn Write + Send>, line_width: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PrinterInner { sink })),
            line_width,
        }
    }

    pub fn stdout(line_width: usize) -> Self {
        Self::new(Box::new(std::io::stdout()), line_width)
    }

    /// Open an exclusive output block for a node. Suspends until every
    /// other node's block has closed.
    pub async fn begin(&self, node_id: &str) -> PrinterBlock {
        let mut guard = self.inner.clone().lock_owned().await;
        let _ = write!(guard.sink, "\n=== node={} ===\n", node_id);
        PrinterBlock {
            guard,
            line_width: self.line_width,
            line_chars: 0,
        }
    }
}

/// One node's exclusive claim on the sink.
pub struct PrinterBlock {
    guard: OwnedMutexGuard<PrinterInner>,
    line_width: usize,
    line_chars: usize,
}

impl PrinterBlock {
    /// Append an increment of streamed content.
    ///
    /// Chunks are split on newlines; an explicit newline resets the
    /// running line count. Within a line, a forced newline is emitted
    /// once the count reaches the configured width, then the count
    /// resets.
    pub fn write_chunk(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        for (i, segment) in chunk.split('\n').enumerate() {
            if i > 0 {
                let _ = writeln!(self.guard.sink);
                self.line_chars = 0;
            }
            if segment.is_empty() {
                continue;
            }
            let _ = write!(self.guard.sink, "{}", segment);
            self.line_chars += segment.chars().count();
            if self.line_chars >= self.line_width {
                let _ = writeln!(self.guard.sink);
                self.line_chars = 0;
            }
        }
    }
}

impl Drop for PrinterBlock {
    fn drop(&mut self) {
        let _ = write!(self.guard.sink, "\n\n");
        let _ = self.guard.sink.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// A Write handle over a shared buffer so tests can read back what
    /// the printer emitted.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
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

    #[tokio::test]
    async fn test_block_header_and_footer() {
        let buf = SharedBuf::default();
        let printer = StreamPrinter::new(Box::new(buf.clone()), 120);
        {
            let mut block = printer.begin("n1").await;
            block.write_chunk("hello");
        }
        let out = buf.contents();
        assert!(out.contains("=== node=n1 ==="));
        assert!(out.contains("hello"));
        assert!(out.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn test_line_wrapping_at_width() {
        let buf = SharedBuf::default();
        let printer = StreamPrinter::new(Box::new(buf.clone()), 10);
        {
            let mut block = printer.begin("n").await;
            // 12 chars across two chunks: forced wrap after the count
            // reaches 10
            block.write_chunk("abcdefgh");
            block.write_chunk("ijkl");
        }
        let out = buf.contents();
        assert!(out.contains("abcdefghijkl\n"));
    }

    #[tokio::test]
    async fn test_explicit_newline_resets_count() {
        let buf = SharedBuf::default();
        let printer = StreamPrinter::new(Box::new(buf.clone()), 10);
        {
            let mut block = printer.begin("n").await;
            block.write_chunk("abcde\nfghij");
        }
        let out = buf.contents();
        assert!(out.contains("abcde\nfghij"));
        // neither 5-char line hit the width, so no forced extra newline
        // between "abcde" and "fghij" beyond the explicit one
        assert!(!out.contains("abcde\n\nfghij"));
    }

    #[tokio::test]
    async fn test_blocks_do_not_interleave() {
        let buf = SharedBuf::default();
        let printer = StreamPrinter::new(Box::new(buf.clone()), 120);

        let mut tasks = tokio::task::JoinSet::new();
        for node in ["a", "b", "c", "d"] {
            let printer = printer.clone();
            tasks.spawn(async move {
                let mut block = printer.begin(node).await;
                for i in 0..20 {
                    block.write_chunk(&format!("{}{} ", node, i));
                    tokio::task::yield_now().await;
                }
            });
        }
        while tasks.join_next().await.is_some() {}

        let out = buf.contents();
        // each node's 20 chunks must form one contiguous region
        for node in ["a", "b", "c", "d"] {
            let first = out.find(&format!("{}0 ", node)).unwrap();
            let last = out.find(&format!("{}19 ", node)).unwrap();
            let region = &out[first..last];
            for other in ["a", "b", "c", "d"] {
                if other != node {
                    assert!(
                        !region.contains(&format!("{}5 ", other)),
                        "block {} interleaved with {}",
                        node,
                        other
                    );
                }
            }
        }
    }
}
