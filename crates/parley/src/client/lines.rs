//! Line splitting over decoded text chunks.

/// Accumulates text and yields complete lines.
///
/// The unterminated remainder is carried into the next push, so a line split
/// across reads comes out whole. Line endings (`\n` or `\r\n`) are stripped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text and return every line it completed.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find('\n') {
            let mut line: String = self.partial.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Take the unterminated remainder at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let mut rest = std::mem::take(&mut self.partial);
        if rest.ends_with('\r') {
            rest.pop();
        }
        (!rest.is_empty()).then_some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_line_reassembled() {
        let mut buffer = LineBuffer::new();

        assert!(buffer.push("data: {\"cont").is_empty());
        assert_eq!(
            buffer.push("ent\":\"Hi\"}\n\ndata: "),
            vec!["data: {\"content\":\"Hi\"}", ""]
        );
        assert_eq!(buffer.push("{}\r\n"), vec!["data: {}"]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_unterminated_remainder() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push("data: tail").is_empty());
        assert_eq!(buffer.finish().as_deref(), Some("data: tail"));
    }
}
