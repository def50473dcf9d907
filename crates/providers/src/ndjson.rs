//! Newline-delimited JSON decoding for streamed chat responses.
//!
//! Ollama streams one JSON object per line. Network chunks do not respect
//! line (or UTF-8) boundaries, so bytes are buffered until a full line is
//! available.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt::Display;
use tracing::{trace, warn};
use zema_core::error::ProviderError;
use zema_core::provider::{ChunkStream, StreamChunk, Usage};

/// Longest line kept by default; anything longer is dropped as malformed.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accumulates raw bytes and hands out complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_line: usize,
    /// Inside an oversized line; bytes are dropped until its newline.
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line: max_line.max(1),
            discarding: false,
        }
    }

    pub fn push(&mut self, mut bytes: &[u8]) {
        if self.discarding {
            let Some(end) = bytes.iter().position(|b| *b == b'\n') else {
                return;
            };
            self.discarding = false;
            bytes = &bytes[end + 1..];
        }

        self.buf.extend_from_slice(bytes);

        let tail_start = self
            .buf
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |i| i + 1);
        if self.buf.len() - tail_start > self.max_line {
            warn!(limit = self.max_line, "Dropping oversized stream line");
            self.buf.truncate(tail_start);
            self.discarding = true;
        }
    }

    /// Next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if std::mem::take(&mut self.discarding) {
            self.buf.clear();
            return None;
        }
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            self.buf.clear();
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// One streamed object from `/api/chat`.
#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Parse a single streamed line.
///
/// `None` means the line carries nothing usable (blank or malformed) and is
/// skipped; an `error` object from the server ends the stream.
pub fn parse_stream_line(line: &str) -> Option<Result<StreamChunk, ProviderError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let parsed: StreamLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            trace!(data = %line, error = %e, "Ignoring unparseable stream line");
            return None;
        }
    };

    if let Some(error) = parsed.error {
        return Some(Err(ProviderError::StreamInterrupted(error)));
    }

    let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
        (Some(prompt), Some(completion)) if parsed.done => Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt.saturating_add(completion),
        }),
        _ => None,
    };

    Some(Ok(StreamChunk {
        content: parsed.message.and_then(|m| m.content),
        done: parsed.done,
        usage,
    }))
}

struct DecodeState<S> {
    bytes: S,
    lines: LineBuffer,
    finished: bool,
}

/// Turn a byte stream into a stream of chunks.
///
/// Ends after the `done` object, after the first transport or server error,
/// or when the bytes run out. Dropping the returned stream drops `bytes`.
pub fn decode_chunks<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = DecodeState {
        bytes,
        lines: LineBuffer::default(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            if let Some(line) = st.lines.next_line() {
                match parse_stream_line(&line) {
                    Some(Ok(chunk)) => {
                        st.finished = chunk.done;
                        return Some((Ok(chunk), st));
                    }
                    Some(Err(e)) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                    None => continue,
                }
            }

            match st.bytes.next().await {
                Some(Ok(bytes)) => st.lines.push(bytes.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(ProviderError::StreamInterrupted(e.to_string())), st));
                }
                None => {
                    st.finished = true;
                    let tail = st.lines.finish()?;
                    let item = parse_stream_line(&tail)?;
                    return Some((item, st));
                }
            }
        }
    })
    .boxed()
}
