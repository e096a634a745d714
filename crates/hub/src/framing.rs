//! Newline framing for a chunked text stream.
//!
//! Each device link owns one [`LineFramer`]. Chunks arrive in whatever sizes
//! the transport hands us; the framer yields every complete line and keeps
//! the unterminated tail around for the next chunk. The tail is dropped on
//! disconnect — a truncated line carries no length field, so it is
//! unrecoverable by design.

/// Per-connection accumulator that splits incoming chunks into lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every complete line it closes.
    ///
    /// The trailing `\n` is stripped; a `\r` left by CRLF framing is trimmed
    /// too. Empty lines are returned as-is — callers drop them silently.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let mut line: String = self.pending.drain(..=pos).collect();
            line.pop(); // the '\n'
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Discard the pending fragment (connection closed or cancelled).
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    #[cfg(test)]
    fn pending(&self) -> &str {
        &self.pending
    }
}

// ===========================================================================
// Tests
// ===========================================================================
