//! Decoding of daemon build and push progress.
//!
//! The daemon answers build and push calls with newline-delimited JSON. A
//! background task splits the body into lines, keeps the interesting ones and
//! forwards them as text through a bounded queue. The queue closing is the
//! only end-of-stream signal.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use docker::ByteStream;
use futures::{Stream, StreamExt as _, TryStreamExt as _};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::io::StreamReader;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Which daemon call produced a progress stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// `POST /build`
    Build,
    /// `POST /images/{name}/push`
    Push,
}

#[derive(Debug, Deserialize)]
struct BuildLine {
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProgressDetail {
    #[serde(default)]
    current: i64,
    #[serde(default)]
    total: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushLine {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<String>,
    #[serde(default)]
    progress_detail: Option<ProgressDetail>,
    #[serde(default)]
    error: Option<String>,
}

impl StreamKind {
    /// Decode one line of daemon output, returning the text to forward.
    ///
    /// Lines which are not JSON, build lines without output, and push lines
    /// without byte counts are dropped.
    pub fn decode_line(self, line: &[u8]) -> Option<String> {
        match self {
            StreamKind::Build => {
                let line: BuildLine = serde_json::from_slice(line).ok()?;
                if let Some(error) = &line.error {
                    tracing::warn!(%error, "daemon reported a build error");
                }
                line.stream.filter(|stream| !stream.is_empty())
            }
            StreamKind::Push => {
                let line: PushLine = serde_json::from_slice(line).ok()?;
                if let Some(error) = &line.error {
                    tracing::warn!(%error, "daemon reported a push error");
                }
                tracing::trace!(id = ?line.id, status = ?line.status, progress = ?line.progress, "push progress");

                let detail = line.progress_detail.unwrap_or_default();
                if detail.current == 0 && detail.total == 0 {
                    return None;
                }
                Some(format!(
                    "current uploaded:{}, total size:{}",
                    detail.current, detail.total
                ))
            }
        }
    }
}

/// Lines of progress from a running build or push.
///
/// Dropping the stream stops the background decoder.
pub struct Progress {
    rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Progress {
    /// Stop decoding. Lines already queued are still delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token which stops this stream when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receive the next line, or `None` once the decoder has finished.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Stream for Progress {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Start decoding `body` on a background task.
///
/// `buffer` bounds the number of undelivered lines; a full queue stops the
/// decoder from reading the body. Must be called within a tokio runtime.
pub fn decode(kind: StreamKind, body: ByteStream, buffer: usize) -> Progress {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let cancel = CancellationToken::new();
    tokio::spawn(pump(kind, body, tx, cancel.clone()));

    Progress {
        rx,
        _guard: cancel.clone().drop_guard(),
        cancel,
    }
}

fn trim_line(mut line: Bytes) -> Bytes {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    line
}

async fn pump(
    kind: StreamKind,
    body: ByteStream,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    let reader = StreamReader::new(body.map_err(std::io::Error::other));
    let mut lines = FramedRead::new(reader, AnyDelimiterCodec::new(b"\n".to_vec(), b"\n".to_vec()));

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(?kind, "progress decoding cancelled");
                return;
            }
            next = lines.next() => next,
        };

        let line = match next {
            Some(Ok(line)) => trim_line(line),
            Some(Err(error)) => {
                tracing::warn!(?kind, %error, "progress stream ended early");
                return;
            }
            None => return,
        };

        let Some(message) = kind.decode_line(&line) else {
            continue;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(?kind, "progress decoding cancelled");
                return;
            }
            sent = tx.send(message) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}
