use std::collections::VecDeque;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use studybuddy_core::{Source, StreamEvent};
use studybuddy_logging::{sb_debug, sb_trace, sb_warn};

use crate::transport::ByteStream;
use crate::{ClientError, FailureKind};

/// Only lines starting with this prefix carry events.
pub const RECORD_PREFIX: &[u8] = b"data: ";

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct SourcesPayload {
    #[serde(default)]
    sources: Vec<Source>,
    #[serde(default)]
    context_used: u32,
}

/// Longest record accepted before its line is rejected as malformed.
pub const MAX_RECORD_LEN: usize = 1 << 20;

/// Splits a chunked byte stream into newline-terminated records and decodes
/// them. Bytes are buffered until their line is complete, so a chunk
/// boundary may fall anywhere, including inside a UTF-8 sequence.
///
/// A line longer than the record limit yields one `MalformedRecord` error
/// and the rest of it is skipped, wherever the chunk boundaries fall.
#[derive(Debug)]
pub struct RecordDecoder {
    buffer: Vec<u8>,
    max_record_len: usize,
    /// Inside an oversized line that was already reported.
    skipping: bool,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::with_max_record_len(MAX_RECORD_LEN)
    }
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_record_len(max_record_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_record_len,
            skipping: false,
        }
    }

    /// Feeds one chunk; returns the decoded events of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, ClientError>> {
        let mut scan_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[scan_from..].iter().position(|&b| b == b'\n') {
            let end = scan_from + offset;
            if std::mem::take(&mut self.skipping) {
                sb_debug!("Skipped the tail of an oversized stream record");
            } else if end - consumed > self.max_record_len {
                events.push(Err(self.oversized()));
            } else if let Some(event) = decode_line(&self.buffer[consumed..end]) {
                events.push(event);
            }
            consumed = end + 1;
            scan_from = consumed;
        }
        self.buffer.drain(..consumed);

        if !self.skipping && self.buffer.len() > self.max_record_len {
            events.push(Err(self.oversized()));
            self.skipping = true;
        }
        if self.skipping {
            self.buffer.clear();
        }
        events
    }

    /// Bytes of the current unterminated line.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Ends the stream. An unterminated trailing fragment is incomplete and
    /// is dropped; returns how many bytes were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len();
        if dropped > 0 {
            sb_debug!("Discarding {} bytes of unterminated stream record", dropped);
        }
        self.buffer.clear();
        self.skipping = false;
        dropped
    }

    fn oversized(&self) -> ClientError {
        ClientError::new(
            FailureKind::MalformedRecord,
            format!("record longer than {} bytes", self.max_record_len),
        )
    }
}

/// Decodes one line without its `\n`. `None` for lines that carry no event.
fn decode_line(line: &[u8]) -> Option<Result<StreamEvent, ClientError>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let payload = line.strip_prefix(RECORD_PREFIX)?;
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(err) => {
            return Some(Err(ClientError::new(
                FailureKind::MalformedRecord,
                format!("record is not valid UTF-8: {err}"),
            )))
        }
    };
    let record: RawRecord = match serde_json::from_str(text) {
        Ok(record) => record,
        Err(err) => {
            return Some(Err(ClientError::new(
                FailureKind::MalformedRecord,
                format!("{err} in {text:?}"),
            )))
        }
    };
    sb_trace!("Stream record type={}", record.kind);

    match record.kind.as_str() {
        "content" => match record.data {
            Value::String(fragment) => Some(Ok(StreamEvent::Content(fragment))),
            other => Some(Err(ClientError::new(
                FailureKind::MalformedRecord,
                format!("content record carries {other} instead of text"),
            ))),
        },
        "sources" => Some(
            serde_json::from_value::<SourcesPayload>(record.data)
                .map(|payload| StreamEvent::Sources {
                    sources: payload.sources,
                    context_used: payload.context_used,
                })
                .map_err(|err| ClientError::new(FailureKind::MalformedRecord, err.to_string())),
        ),
        "done" => Some(Ok(StreamEvent::Done)),
        "error" => Some(Ok(StreamEvent::Error(error_text(&record.data)))),
        other => {
            sb_debug!("Skipping stream record of unknown type {:?}", other);
            None
        }
    }
}

fn error_text(data: &Value) -> String {
    match data {
        Value::String(text) if !text.is_empty() => text.clone(),
        Value::Object(fields) => fields
            .get("message")
            .or_else(|| fields.get("detail"))
            .and_then(Value::as_str)
            .unwrap_or("stream error")
            .to_string(),
        _ => "stream error".to_string(),
    }
}

/// Lazy, finite sequence of the events of one chat answer.
///
/// The sequence ends when the body ends or right after the first error
/// event; it cannot be restarted. Malformed records, transport failures and
/// an empty body surface as [`StreamEvent::Error`], exactly like a
/// server-sent error.
pub struct ChatStream<S = ByteStream> {
    body: Option<S>,
    decoder: RecordDecoder,
    pending: VecDeque<Result<StreamEvent, ClientError>>,
    /// Whether the body produced any bytes at all.
    received: bool,
    failure: Option<ClientError>,
}

impl<S> ChatStream<S>
where
    S: Stream<Item = Result<Bytes, ClientError>> + Unpin,
{
    pub fn new(body: S) -> Self {
        Self {
            body: Some(body),
            decoder: RecordDecoder::new(),
            pending: VecDeque::new(),
            received: false,
            failure: None,
        }
    }

    /// A stream that could not be opened: yields one error event, then ends.
    pub fn failed(error: ClientError) -> Self {
        Self {
            body: None,
            decoder: RecordDecoder::new(),
            pending: VecDeque::from([Err(error)]),
            received: false,
            failure: None,
        }
    }

    /// Why the stream aborted, once it has.
    pub fn failure(&self) -> Option<&ClientError> {
        self.failure.as_ref()
    }

    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(match item {
                    Ok(StreamEvent::Error(message)) => {
                        self.abort(ClientError::new(FailureKind::ServerError, message.clone()));
                        StreamEvent::Error(message)
                    }
                    Ok(event) => event,
                    Err(err) => {
                        let message = err.to_string();
                        self.abort(err);
                        StreamEvent::Error(message)
                    }
                });
            }

            let body = self.body.as_mut()?;
            match body.next().await {
                Some(Ok(chunk)) => {
                    self.received |= !chunk.is_empty();
                    let events = self.decoder.push(&chunk);
                    self.pending.extend(events);
                }
                Some(Err(err)) => self.pending.push_back(Err(err)),
                None => {
                    self.decoder.finish();
                    self.body = None;
                    if !self.received {
                        self.pending.push_back(Err(ClientError::new(
                            FailureKind::MissingBody,
                            "chat response has no body",
                        )));
                    }
                }
            }
        }
    }

    fn abort(&mut self, error: ClientError) {
        sb_warn!("Chat stream aborted ({:?}): {}", error.class(), error);
        self.pending.clear();
        self.decoder.finish();
        self.body = None;
        self.failure = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_without_prefix_are_skipped() {
        assert_eq!(decode_line(b""), None);
        assert_eq!(decode_line(b": keep-alive"), None);
        assert_eq!(decode_line(b"event: message"), None);
    }

    #[test]
    fn crlf_is_tolerated() {
        assert_eq!(
            decode_line(b"data: {\"type\":\"content\",\"data\":\"x\"}\r"),
            Some(Ok(StreamEvent::Content("x".to_string())))
        );
    }

    #[test]
    fn done_accepts_missing_or_null_data() {
        assert_eq!(decode_line(b"data: {\"type\":\"done\"}"), Some(Ok(StreamEvent::Done)));
        assert_eq!(
            decode_line(b"data: {\"type\":\"done\",\"data\":null}"),
            Some(Ok(StreamEvent::Done))
        );
    }

    #[test]
    fn unknown_types_are_skipped() {
        assert_eq!(decode_line(b"data: {\"type\":\"usage\",\"data\":{}}"), None);
    }

    #[test]
    fn error_text_reads_string_or_object() {
        assert_eq!(error_text(&Value::from("rate limited")), "rate limited");
        assert_eq!(
            error_text(&serde_json::json!({ "message": "model offline" })),
            "model offline"
        );
        assert_eq!(error_text(&Value::Null), "stream error");
    }

    #[test]
    fn non_text_content_is_malformed() {
        let decoded = decode_line(b"data: {\"type\":\"content\",\"data\":42}").unwrap();
        assert_eq!(decoded.unwrap_err().kind, FailureKind::MalformedRecord);
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let decoded = decode_line(b"data: \xff\xfe").unwrap();
        assert_eq!(decoded.unwrap_err().kind, FailureKind::MalformedRecord);
    }
}
