//! Line protocol spoken by `POST /api/validate`.
//!
//! The body is plain text. Lines starting with [`DATA_PREFIX`] carry a JSON
//! [`ProgressEvent`]; anything else, including prefixed lines whose JSON does not parse,
//! is shown verbatim in the output log. Bytes are buffered until a newline arrives so a
//! line split across chunks is delivered exactly once.

use crate::model::ProgressEvent;

pub const DATA_PREFIX: &str = "data: ";

/// Longest unterminated line held back; anything beyond is flushed as raw text.
pub const MAX_PENDING: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    Progress(ProgressEvent),
    Raw(String),
}

/// Classify one complete line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<StreamLine> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return None;
    }
    if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
        if let Ok(ev) = serde_json::from_str::<ProgressEvent>(payload) {
            return Some(StreamLine::Progress(ev));
        }
    }
    Some(StreamLine::Raw(line.to_string()))
}

/// Incremental splitter that carries incomplete trailing bytes across chunks.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamLine> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        if let Some(last_nl) = self.pending.iter().rposition(|b| *b == b'\n') {
            let rest = self.pending.split_off(last_nl + 1);
            let complete = std::mem::replace(&mut self.pending, rest);
            lines.extend(
                complete
                    .split(|b| *b == b'\n')
                    .filter_map(|raw| parse_line(&String::from_utf8_lossy(raw))),
            );
        }
        if self.pending.len() > MAX_PENDING {
            lines.extend(self.finish());
        }
        lines
    }

    /// Flush a final unterminated line once the body has ended.
    pub fn finish(&mut self) -> Option<StreamLine> {
        let rest = std::mem::take(&mut self.pending);
        parse_line(&String::from_utf8_lossy(&rest))
    }

    /// Bytes held back waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
