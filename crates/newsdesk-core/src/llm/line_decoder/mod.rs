//! Buffered line decoder for streaming LLM responses
//!
//! Every vendor this subsystem talks to frames its stream in newline-delimited
//! units: `data: `-prefixed SSE lines (OpenAI-compatible, Anthropic, Gemini)
//! or bare JSON objects per line (Ollama). Network chunks do not respect those
//! boundaries, and can split multi-byte UTF-8 characters, so decoding has to
//! buffer across `feed` calls.

/// Incremental byte-to-line decoder
///
/// Feed raw transport chunks in, get back complete text lines with their
/// terminators stripped. Blank lines are dropped; they separate SSE events
/// and carry nothing any provider parses.
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Decoded text waiting for a line terminator
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence cut off by a chunk boundary
    incomplete_utf8: Vec<u8>,
}

impl LineDecoder {
    /// Create a new line decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes into the decoder and extract complete lines
    ///
    /// Incomplete trailing data (a partial line, or a partial UTF-8 sequence)
    /// is buffered until the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let bytes = if self.incomplete_utf8.is_empty() {
            chunk.to_vec()
        } else {
            let mut combined = std::mem::take(&mut self.incomplete_utf8);
            combined.extend_from_slice(chunk);
            combined
        };

        let (text, remainder) = Self::decode_utf8_with_remainder(&bytes);
        self.incomplete_utf8 = remainder;
        self.buffer.push_str(&text);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Flush the final unterminated line once the transport stream ends
    pub fn finish(&mut self) -> Option<String> {
        if !self.incomplete_utf8.is_empty() {
            tracing::warn!(
                bytes = self.incomplete_utf8.len(),
                "stream ended inside a UTF-8 sequence, dropping trailing bytes"
            );
            self.incomplete_utf8.clear();
        }

        let mut line = std::mem::take(&mut self.buffer);
        if line.ends_with('\r') {
            line.pop();
        }
        if line.is_empty() { None } else { Some(line) }
    }

    /// Whether any partial line or partial UTF-8 sequence is still buffered
    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty() || !self.incomplete_utf8.is_empty()
    }

    /// Decode as much of `bytes` as is valid UTF-8
    ///
    /// A sequence cut off at the end of the input is returned as the
    /// remainder for the next chunk to complete. Bytes that can never form a
    /// valid character are dropped with a warning rather than poisoning the
    /// whole stream.
    fn decode_utf8_with_remainder(bytes: &[u8]) -> (String, Vec<u8>) {
        let mut out = String::new();
        let mut rest = bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    return (out, Vec::new());
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        // Invalid bytes in the middle of the stream
                        Some(n) => {
                            tracing::warn!(skipped = n, "invalid UTF-8 in stream chunk");
                            rest = &after[n..];
                        }
                        // Possibly-valid prefix of a character at the end
                        None => return (out, after.to_vec()),
                    }
                }
            }
        }
    }
}
