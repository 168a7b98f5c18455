//! Incremental Server-Sent Events decoding.
//!
//! ## SSE Format
//!
//! An event is a run of `field: value` lines terminated by a blank line:
//! ```text
//! id: 42
//! event: message
//! data: {"jsonrpc": "2.0", ...}
//!
//! ```
//!
//! Lines may end in CR, LF or CRLF, and network chunks split lines (and CRLF pairs)
//! at arbitrary positions. [`SseParser`] buffers raw bytes and only interprets a line
//! once its terminator has arrived, so the decoded events do not depend on how the
//! stream was chunked.

use tracing::trace;

/// Event type used when an event carries no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// A completed Server-Sent Event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (`"message"` unless an `event:` field said otherwise)
    pub event_type: String,
    /// Concatenated `data:` values, each followed by a line feed
    pub data: String,
    /// Value of the `id:` field seen in this event, if any
    pub id: Option<String>,
    /// Reconnection interval hint in milliseconds seen in this event, if any
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Data with the final line feed removed.
    pub fn payload(&self) -> &str {
        self.data.strip_suffix('\n').unwrap_or(&self.data)
    }
}

/// Incremental SSE decoder for one connection.
///
/// Owned by the task reading the stream. Feed it raw body chunks with
/// [`SseParser::feed`]; every completed event is returned in order.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Unconsumed bytes: at most one partial line.
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a terminator.
    scan: usize,
    /// The previous feed ended on CR; a leading LF completes that CRLF.
    pending_cr: bool,

    event_type: Option<String>,
    data: String,
    has_data: bool,
    event_id: Option<String>,
    event_retry: Option<u64>,

    last_event_id: Option<String>,
    retry_hint: Option<u64>,
    invalid_lines: u64,
}

impl SseParser {
    /// Create a new SSE parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser for a resumed connection, remembering the id seen on the previous one.
    pub fn with_last_event_id(last_event_id: Option<String>) -> Self {
        Self {
            last_event_id,
            ..Self::default()
        }
    }

    /// Feed a chunk of the body and extract any events it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if chunk.is_empty() {
            return events;
        }
        self.buffer.extend_from_slice(chunk);

        let mut line_start = 0;
        if self.pending_cr {
            self.pending_cr = false;
            if self.buffer[0] == b'\n' {
                line_start = 1;
            }
        }

        // take the buffer so lines can be borrowed while fields are applied
        let buffer = std::mem::take(&mut self.buffer);
        let mut pos = self.scan.max(line_start);
        while pos < buffer.len() {
            match buffer[pos] {
                b'\n' => {
                    self.process_line(&buffer[line_start..pos], &mut events);
                    pos += 1;
                    line_start = pos;
                }
                b'\r' => {
                    self.process_line(&buffer[line_start..pos], &mut events);
                    match buffer.get(pos + 1) {
                        Some(b'\n') => pos += 2,
                        Some(_) => pos += 1,
                        None => {
                            self.pending_cr = true;
                            pos += 1;
                        }
                    }
                    line_start = pos;
                }
                _ => pos += 1,
            }
        }
        self.buffer = buffer;
        self.buffer.drain(..line_start);
        self.scan = self.buffer.len();

        events
    }

    fn process_line(&mut self, line: &[u8], events: &mut Vec<SseEvent>) {
        let Ok(line) = std::str::from_utf8(line) else {
            self.invalid_lines += 1;
            trace!(len = line.len(), "skipping SSE line with invalid UTF-8");
            return;
        };

        if line.is_empty() {
            if let Some(event) = self.emit_event() {
                events.push(event);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\0') {
                    self.event_id = Some(value.to_string());
                    self.last_event_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    // all digits but too large for u64 is ignored like any other bad value
                    if let Ok(ms) = value.parse() {
                        self.event_retry = Some(ms);
                        self.retry_hint = Some(ms);
                    }
                }
            }
            _ => {} // Unknown field, ignore
        }
    }

    /// Emit the current event if data is present, then reset it.
    fn emit_event(&mut self) -> Option<SseEvent> {
        let event_type = self.event_type.take();
        let id = self.event_id.take();
        let retry = self.event_retry.take();
        let data = std::mem::take(&mut self.data);

        if !std::mem::take(&mut self.has_data) {
            return None;
        }

        Some(SseEvent {
            event_type: event_type.unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            data,
            id,
            retry,
        })
    }

    /// Last event id seen on this connection, for `Last-Event-ID` on reconnect.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Most recent `retry:` value in milliseconds.
    pub fn retry_hint(&self) -> Option<u64> {
        self.retry_hint
    }

    /// Lines skipped because they were not valid UTF-8.
    pub fn invalid_lines(&self) -> u64 {
        self.invalid_lines
    }

    /// Bytes buffered while waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn event(event_type: &str, data: &str, id: Option<&str>) -> SseEvent {
        SseEvent {
            event_type: event_type.to_string(),
            data: data.to_string(),
            id: id.map(str::to_string),
            retry: None,
        }
    }

    #[test]
    fn test_sse_parser_simple() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: hello\n\n");

        assert_eq!(events, vec![event("message", "hello\n", None)]);
        assert_eq!(events[0].payload(), "hello");
    }

    #[test]
    fn test_sse_parser_with_id_and_type() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"id: 123\nevent: endpoint\ndata: /messages\n\n");

        assert_eq!(events, vec![event("endpoint", "/messages\n", Some("123"))]);
        assert_eq!(parser.last_event_id(), Some("123"));
    }

    #[test]
    fn test_sse_parser_multiline_data() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: foo\ndata: bar\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "foo\nbar\n");
    }

    #[test]
    fn test_sse_parser_multiple_events() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: first\n\ndata: second\n\n");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload(), "first");
        assert_eq!(events[1].payload(), "second");
    }

    #[test]
    fn test_sse_parser_incremental() {
        let mut parser = SseParser::new();

        assert!(parser.feed(b"id: 1\n").is_empty());
        assert!(parser.feed(b"data: par").is_empty());
        assert_eq!(parser.pending_len(), 9);
        assert!(parser.feed(b"tial\n").is_empty());

        let events = parser.feed(b"\n");
        assert_eq!(events, vec![event("message", "partial\n", Some("1"))]);
        assert_eq!(parser.pending_len(), 0);
    }

    #[test]
    fn test_sse_parser_line_endings() {
        let expected = vec![
            event("endpoint", "a\n", None),
            event("message", "b\nc\n", None),
        ];
        for ending in ["\n", "\r", "\r\n"] {
            let body = "event: endpoint|data: a||data: b|data: c||".replace('|', ending);
            let mut parser = SseParser::new();
            assert_eq!(parser.feed(body.as_bytes()), expected, "ending {:?}", ending);
        }
    }

    #[test]
    fn test_sse_parser_crlf_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: x\r").is_empty());
        // the LF completes the CRLF above; it is not a blank line
        assert!(parser.feed(b"\n").is_empty());
        let events = parser.feed(b"\r\n");
        assert_eq!(events, vec![event("message", "x\n", None)]);
    }

    #[test]
    fn test_sse_parser_ignores_comments() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": this is a comment\ndata: actual data\n:another\n\n");

        assert_eq!(events, vec![event("message", "actual data\n", None)]);
    }

    #[test]
    fn test_sse_parser_comment_only_block_dispatches_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b": keepalive\n\n").is_empty());
        assert!(parser.feed(b"event: endpoint\n\n").is_empty());
        // the type set above was reset with the empty event
        assert_eq!(parser.feed(b"data: x\n\n")[0].event_type, "message");
    }

    #[test]
    fn test_sse_parser_field_syntax() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data:no-space\ndata:  two-spaces\ndata\nfoo: bar\n\n");

        assert_eq!(events[0].data, "no-space\n two-spaces\n\n");
    }

    #[test]
    fn test_sse_parser_retry() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"retry: 5000\ndata: test\n\n");

        assert_eq!(events[0].retry, Some(5000));
        assert_eq!(parser.retry_hint(), Some(5000));

        let events = parser.feed(b"retry: 5s\ndata: test\n\n");
        assert_eq!(events[0].retry, None);
        assert_eq!(parser.retry_hint(), Some(5000));
    }

    #[test]
    fn test_sse_parser_id_with_nul_is_ignored() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"id: 1\ndata: a\n\nid: 2\0x\ndata: b\n\n");

        assert_eq!(events[1].id, None);
        assert_eq!(parser.last_event_id(), Some("1"));
    }

    #[test]
    fn test_sse_parser_skips_invalid_utf8_lines() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: \xff\xfe\ndata: ok\n\n");

        assert_eq!(events, vec![event("message", "ok\n", None)]);
        assert_eq!(parser.invalid_lines(), 1);
    }

    #[test]
    fn test_sse_parser_resumes_with_last_event_id() {
        let mut parser = SseParser::with_last_event_id(Some("41".to_string()));
        assert_eq!(parser.last_event_id(), Some("41"));
        parser.feed(b"id: 42\ndata: x\n\n");
        assert_eq!(parser.last_event_id(), Some("42"));
        assert_eq!(parser.pending_len(), 0);
    }

    #[test]
    fn test_sse_parser_unterminated_tail_is_not_dispatched() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: never finished\n").is_empty());
        assert!(parser.feed(b"data: still open").is_empty());
    }

    fn arb_event() -> impl Strategy<Value = (Option<String>, Vec<String>, Option<String>)> {
        (
            proptest::option::of("[a-z]{1,8}"),
            proptest::collection::vec("[ -9;-~]{0,12}", 1..4),
            proptest::option::of("[0-9a-f]{1,6}"),
        )
    }

    fn render(
        events: &[(Option<String>, Vec<String>, Option<String>)],
        ending: &str,
    ) -> (Vec<u8>, Vec<SseEvent>) {
        let mut body = String::new();
        let mut expected = Vec::new();
        for (event_type, lines, id) in events {
            body.push_str(&format!(": comment{ending}"));
            if let Some(t) = event_type {
                body.push_str(&format!("event: {t}{ending}"));
            }
            if let Some(id) = id {
                body.push_str(&format!("id: {id}{ending}"));
            }
            let mut data = String::new();
            for line in lines {
                body.push_str(&format!("data: {line}{ending}"));
                data.push_str(line);
                data.push('\n');
            }
            body.push_str(ending);
            expected.push(SseEvent {
                event_type: event_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
                data,
                id: id.clone(),
                retry: None,
            });
        }
        (body.into_bytes(), expected)
    }

    proptest! {
        #[test]
        fn prop_chunk_boundaries_do_not_matter(
            events in proptest::collection::vec(arb_event(), 1..6),
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..12),
            ending in prop_oneof![Just("\n"), Just("\r"), Just("\r\n")],
        ) {
            let (body, expected) = render(&events, ending);

            let mut whole = SseParser::new();
            prop_assert_eq!(&whole.feed(&body), &expected);

            let mut offsets: Vec<usize> = cuts.iter().map(|i| i.index(body.len() + 1)).collect();
            offsets.push(0);
            offsets.push(body.len());
            offsets.sort_unstable();
            offsets.dedup();

            let mut chunked = SseParser::new();
            let mut decoded = Vec::new();
            for pair in offsets.windows(2) {
                decoded.extend(chunked.feed(&body[pair[0]..pair[1]]));
            }
            prop_assert_eq!(&decoded, &expected);
            prop_assert_eq!(chunked.pending_len(), 0);
        }

        #[test]
        fn prop_byte_at_a_time(events in proptest::collection::vec(arb_event(), 1..4)) {
            let (body, expected) = render(&events, "\r\n");
            let mut parser = SseParser::new();
            let decoded: Vec<SseEvent> = body.iter().flat_map(|b| parser.feed(&[*b])).collect();
            prop_assert_eq!(decoded, expected);
        }
    }
}
