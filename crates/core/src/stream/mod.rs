//! Boundary codecs for the backend API: the `text/event-stream` chat
//! response and JSON error bodies.

use serde_json::Value;

const DATA_PREFIX: &str = "data: ";

/// Incremental decoder for chat streams. Bytes may arrive split anywhere,
/// including inside a line or a multi-byte character; only complete lines
/// are inspected. Invalid UTF-8 is replaced with U+FFFD so one bad line never
/// costs the chunks around it.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the payloads of every completed `data: `
    /// line, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(payload) = decode_line(&line[..newline]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Ends the stream, decoding a trailing line that had no terminator.
    pub fn finish(mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        decode_line(&rest)
    }
}

fn decode_line(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line)
        .strip_prefix(DATA_PREFIX)
        .map(str::to_string)
}

/// Message for a failed request: the server's `detail` field when the body
/// carries one, otherwise the transport status text.
pub fn api_error_message(status_text: &str, body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| match value.get("detail") {
            Some(Value::String(detail)) if !detail.is_empty() => Some(detail.clone()),
            _ => None,
        })
        .unwrap_or_else(|| status_text.to_string())
}

/// `Authorization` header value for a stored session token.
pub fn bearer_header(token: Option<&str>) -> Option<String> {
    token
        .filter(|token| !token.is_empty())
        .map(|token| format!("Bearer {token}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_data_lines_only() {
        let mut decoder = SseDecoder::new();
        let chunks = decoder.push(b"event: message\ndata: Hello\n\ndata: world\n: comment\n");
        assert_eq!(chunks, vec!["Hello", "world"]);
    }

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"da").is_empty());
        assert!(decoder.push(b"ta: Good mor").is_empty());
        assert_eq!(decoder.push(b"ning\r\ndata: !"), vec!["Good morning"]);
        assert_eq!(decoder.finish(), Some("!".to_string()));
    }

    #[test]
    fn keeps_split_multibyte_characters() {
        let text = "data: café\n".as_bytes();
        let split = text.len() - 2;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&text[..split]).is_empty());
        assert_eq!(decoder.push(&text[split..]), vec!["café"]);
    }

    #[test]
    fn invalid_utf8_line_does_not_drop_neighbours() {
        let mut decoder = SseDecoder::new();
        let chunks = decoder.push(b"data: first\ndata: \xff\ndata: third\n");
        assert_eq!(chunks, vec!["first", "\u{fffd}", "third"]);
        assert!(decoder.push(b"").is_empty());
    }

    #[test]
    fn error_message_prefers_detail() {
        assert_eq!(
            api_error_message("Bad Request", br#"{"detail":"essay too short"}"#),
            "essay too short"
        );
        assert_eq!(api_error_message("Bad Gateway", b"<html>"), "Bad Gateway");
        assert_eq!(api_error_message("Not Found", br#"{"detail":""}"#), "Not Found");
    }

    #[test]
    fn bearer_header_needs_a_token() {
        assert_eq!(bearer_header(Some("abc")), Some("Bearer abc".to_string()));
        assert_eq!(bearer_header(Some("")), None);
        assert_eq!(bearer_header(None), None);
    }
}
