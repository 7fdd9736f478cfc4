use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::api::{extract_error_summary, ChatResponse};
use crate::core::error::DeliveryError;

const DONE_TOKEN: &str = "[DONE]";

/// Events delivered to the conversation controller for one exchange.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamMessage {
    /// Incremental assistant text, in network order.
    Chunk(String),
    /// A retry attempt is starting; text received so far is void.
    Restart,
    /// The exchange finished with the full assistant reply.
    Done(String),
    Failed(DeliveryError),
}

/// Sending half of an exchange's event channel, tagged with its stream id.
#[derive(Clone, Debug)]
pub struct DeltaSink {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
}

impl DeltaSink {
    pub fn new(tx: mpsc::UnboundedSender<(StreamMessage, u64)>, stream_id: u64) -> Self {
        Self { tx, stream_id }
    }

    pub fn chunk(&self, text: impl Into<String>) {
        self.send(StreamMessage::Chunk(text.into()));
    }

    pub fn restart(&self) {
        self.send(StreamMessage::Restart);
    }

    pub fn send(&self, message: StreamMessage) {
        // The receiver going away means nobody is listening for this exchange.
        let _ = self.tx.send((message, self.stream_id));
    }
}

/// Result of decoding one line of the event stream.
#[derive(Debug, PartialEq)]
pub enum Frame {
    Delta(String),
    Done,
    Error(DeliveryError),
    /// Blank lines, comments, non-data fields, empty deltas and
    /// undecodable payloads.
    Ignored,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Decode a single `data: <json>` line.
///
/// An undecodable payload is logged and ignored so one bad frame never ends
/// the stream. A payload carrying an `error` object ends it with an API error.
pub fn parse_frame(line: &str) -> Frame {
    let line = line.trim();
    if line.is_empty() {
        return Frame::Ignored;
    }
    let Some(payload) = extract_data_payload(line) else {
        return Frame::Ignored;
    };
    if payload == DONE_TOKEN {
        return Frame::Done;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            if let Some(error) = response.error {
                let status = error
                    .get("code")
                    .and_then(|code| code.as_u64())
                    .and_then(|code| u16::try_from(code).ok());
                let message = extract_error_summary(&serde_json::json!({ "error": error }))
                    .unwrap_or_else(|| "stream reported an error".to_string());
                return Frame::Error(DeliveryError::Api { message, status });
            }
            match response.delta_content() {
                Some(content) if !content.is_empty() => Frame::Delta(content.to_string()),
                _ => Frame::Ignored,
            }
        }
        Err(err) => {
            warn!(error = %err, payload, "Skipping undecodable stream frame");
            Frame::Ignored
        }
    }
}

enum Step {
    Delta(String),
    Done,
    Fail(DeliveryError),
    Skip,
}

enum Read<T> {
    Cancelled,
    Item(Option<T>),
}

/// Lazy sequence of text deltas decoded from a server-sent-event body.
///
/// Deltas come out in arrival order and are folded into a running
/// aggregate. The underlying body is dropped as soon as the sequence ends,
/// whether by terminator, end of input, error, or cancellation.
pub struct DeltaStream<S> {
    inner: Option<S>,
    buffer: Vec<u8>,
    aggregate: String,
    cancel: CancellationToken,
    finished: bool,
}

impl<S, B, E> DeltaStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    pub fn new(inner: S, cancel: CancellationToken) -> Self {
        Self {
            inner: Some(inner),
            buffer: Vec::new(),
            aggregate: String::new(),
            cancel,
            finished: false,
        }
    }

    /// Next delta, `None` once the stream is over.
    pub async fn next_delta(&mut self) -> Option<Result<String, DeliveryError>> {
        loop {
            if self.finished {
                return None;
            }

            while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
                let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
                match self.process_line(&line[..newline_pos]) {
                    Step::Delta(delta) => return Some(Ok(delta)),
                    Step::Done => {
                        self.finish();
                        return None;
                    }
                    Step::Fail(err) => {
                        self.finish();
                        return Some(Err(err));
                    }
                    Step::Skip => {}
                }
            }

            let read = match self.inner.as_mut() {
                Some(inner) => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => Read::Cancelled,
                        item = inner.next() => Read::Item(item),
                    }
                }
                None => {
                    self.finish();
                    return None;
                }
            };

            match read {
                Read::Cancelled => {
                    self.finish();
                    return Some(Err(DeliveryError::Cancelled));
                }
                Read::Item(Some(Ok(bytes))) => self.buffer.extend_from_slice(bytes.as_ref()),
                Read::Item(Some(Err(err))) => {
                    self.finish();
                    return Some(Err(DeliveryError::api(format!(
                        "stream read failed: {err}"
                    ))));
                }
                Read::Item(None) => {
                    // Release the body now; a trailing unterminated frame is
                    // still decoded on the next pass.
                    self.inner = None;
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                    }
                }
            }
        }
    }

    pub fn aggregate(&self) -> &str {
        &self.aggregate
    }

    pub fn into_aggregate(self) -> String {
        self.aggregate
    }

    /// Drain the sequence, forwarding each delta to `sink` before the next
    /// read, and return the aggregate.
    pub async fn collect_into(mut self, sink: Option<&DeltaSink>) -> Result<String, DeliveryError> {
        while let Some(delta) = self.next_delta().await {
            let delta = delta?;
            if let Some(sink) = sink {
                sink.chunk(delta);
            }
        }
        Ok(self.into_aggregate())
    }

    fn process_line(&mut self, raw: &[u8]) -> Step {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "Skipping stream frame with invalid UTF-8");
                return Step::Skip;
            }
        };
        match parse_frame(line) {
            Frame::Delta(delta) => {
                self.aggregate.push_str(&delta);
                Step::Delta(delta)
            }
            Frame::Done => Step::Done,
            Frame::Error(err) => Step::Fail(err),
            Frame::Ignored => Step::Skip,
        }
    }

    fn finish(&mut self) {
        self.inner = None;
        self.buffer.clear();
        self.finished = true;
    }
}
