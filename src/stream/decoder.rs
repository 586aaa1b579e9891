//! Incremental UTF-8 line decoding.

/// Decodes a byte stream into complete text lines.
///
/// Bytes of a multi-byte character split across pushes are held back until the
/// character is complete. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8LineDecoder {
    pending: Vec<u8>,
    text: String,
}

impl Utf8LineDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
            text: String::new(),
        }
    }

    /// Feed raw bytes and return every line completed by them.
    ///
    /// Line terminators (`\n`, optionally preceded by `\r`) are stripped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        self.decode_pending();
        self.take_lines()
    }

    /// Flush the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }

        let mut lines = self.take_lines();
        if !self.text.is_empty() {
            let rest = std::mem::take(&mut self.text);
            lines.push(rest.trim_end_matches('\r').to_string());
        }
        // `take_lines` already drained every terminated line, so at most one remains.
        lines.pop()
    }

    fn decode_pending(&mut self) {
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending[start..valid_end]) {
                        self.text.push_str(valid);
                    }
                    match err.error_len() {
                        Some(invalid) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + invalid;
                        }
                        None => {
                            // Incomplete character at the end: wait for more bytes.
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
    }

    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.text.find('\n') {
            let line: String = self.text.drain(..=pos).collect();
            lines.push(line.trim_end_matches('\n').trim_end_matches('\r').to_string());
        }
        lines
    }
}
