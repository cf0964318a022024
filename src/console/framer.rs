//! Line framing for child process output channels.
//!
//! Raw bytes arrive from the child's stdout/stderr in arbitrarily sized
//! chunks that are not aligned to line boundaries. The framer buffers bytes
//! until a newline and decodes each complete line with a configurable
//! encoding, substituting undecodable sequences. Decoding never fails and
//! no bytes are dropped.

use std::collections::VecDeque;

use encoding_rs::Encoding;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read buffer size for the async line stream.
const READ_CHUNK_SIZE: usize = 4096;

/// Reassembles byte chunks into complete, decoded text lines.
///
/// Bytes are held undecoded until a full line is available, so multi-byte
/// sequences split across chunk boundaries decode correctly.
#[derive(Debug)]
pub struct LineFramer {
    encoding: &'static Encoding,
    pending: Vec<u8>,
}

impl LineFramer {
    /// Create a framer decoding with the given encoding.
    #[must_use]
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            pending: Vec::new(),
        }
    }

    /// Create a UTF-8 framer.
    #[must_use]
    pub fn utf8() -> Self {
        Self::new(encoding_rs::UTF_8)
    }

    /// Resolve an encoding label (e.g. `"utf-8"`, `"ibm866"`).
    ///
    /// Returns `None` for unknown labels.
    #[must_use]
    pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
        Encoding::for_label(label.trim().as_bytes())
    }

    /// Feed a chunk of bytes, returning every line completed by it.
    ///
    /// Lines are returned in arrival order with the terminator (and any
    /// preceding `\r`) stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop(); // the '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(self.decode(&line));
        }
        lines
    }

    /// Flush the trailing unterminated fragment as a final line, if any.
    ///
    /// Called when the channel closes.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(self.decode(&line))
    }

    fn decode(&self, bytes: &[u8]) -> String {
        let (text, _) = self.encoding.decode_without_bom_handling(bytes);
        text.into_owned()
    }
}

/// Turn an async byte reader (a child pipe) into a stream of decoded lines.
///
/// The stream yields lines until the reader reaches end-of-stream, flushing
/// any trailing fragment as the final item. Read errors end the stream after
/// the flush; a log channel must never take the supervisor down.
pub fn lines<R>(reader: R, encoding: &'static Encoding) -> impl futures_core::Stream<Item = String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    struct State<R> {
        reader: R,
        framer: LineFramer,
        queued: VecDeque<String>,
        eof: bool,
    }

    let state = State {
        reader,
        framer: LineFramer::new(encoding),
        queued: VecDeque::new(),
        eof: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.queued.pop_front() {
                return Some((line, state));
            }
            if state.eof {
                return None;
            }

            let mut buf = [0u8; READ_CHUNK_SIZE];
            match state.reader.read(&mut buf).await {
                Ok(0) => {
                    state.eof = true;
                    state.queued.extend(state.framer.flush());
                }
                Ok(n) => state.queued.extend(state.framer.push(&buf[..n])),
                Err(e) => {
                    tracing::debug!(error = %e, "Output channel read failed, treating as closed");
                    state.eof = true;
                    state.queued.extend(state.framer.flush());
                }
            }
        }
    })
}
