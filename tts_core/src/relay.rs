//! Streaming relay from the speech provider to a single consumer.
//!
//! `StreamRelay::relay` opens the upstream audio stream, hands back a
//! [`StreamHandle`] right away and forwards chunks on a spawned task. The
//! handle is an ordinary `Stream` of `Bytes`, so it can be used directly as
//! an HTTP response body. Dropping the handle cancels the forwarding task.
//!
//! Every forwarding run ends by consuming its sink through
//! [`ChunkSink::close`], which is what guarantees a single finalization.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::error::SpeechError;
use crate::provider::{ByteStream, SpeechProvider};
use crate::settings::{ConvertRequest, SynthesisRequest, DEFAULT_MODEL_ID};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// Lifecycle of one relay. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Opening,
    Forwarding,
    Closed,
}

/// Why a forwarding run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEnd {
    Completed,
    UpstreamFailed(String),
    ConsumerDisconnected,
    Cancelled,
    TimedOut,
}

impl RelayEnd {
    /// True when the consumer saw fewer bytes than the provider would have sent.
    pub fn is_interrupted(&self) -> bool {
        !matches!(self, RelayEnd::Completed)
    }
}

/// Summary of a finished forwarding run.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayReport {
    pub chunks: usize,
    pub bytes: u64,
    pub end: RelayEnd,
}

/// Receives one report per finished relay.
pub trait RelayObserver: Send + Sync {
    fn on_closed(&self, report: &RelayReport);
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl RelayObserver for NoopObserver {
    fn on_closed(&self, _report: &RelayReport) {}
}

/// Returned by [`ChunkSink::write`] once the consumer is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Downstream half of a relay.
#[async_trait]
pub trait ChunkSink: Send + Sized {
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed>;

    /// Whether the consumer has already gone away.
    fn is_closed(&self) -> bool {
        false
    }

    /// Finalize the sink. Takes `self` so it can only happen once.
    async fn close(self, report: &RelayReport);
}

/// Sink backed by the channels that feed a [`StreamHandle`].
///
/// Chunks go through a bounded channel. The terminal error of an interrupted
/// relay goes through a oneshot, so closing never waits on the consumer.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
    terminal: oneshot::Sender<SpeechError>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>, terminal: oneshot::Sender<SpeechError>) -> Self {
        Self { tx, terminal }
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.tx.send(chunk).await.map_err(|_| SinkClosed)
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn close(self, report: &RelayReport) {
        // The handle yields this after the buffered chunks, which makes the
        // HTTP layer abort the chunked body instead of ending it cleanly.
        let reason = match &report.end {
            RelayEnd::Completed | RelayEnd::ConsumerDisconnected => return,
            RelayEnd::UpstreamFailed(reason) => reason.clone(),
            RelayEnd::TimedOut => "stream deadline exceeded".to_string(),
            RelayEnd::Cancelled => "relay cancelled".to_string(),
        };
        if !self.tx.is_closed() {
            let _ = self.terminal.send(SpeechError::StreamInterrupted(reason));
        }
    }
}

enum Step {
    Next(Option<Result<Bytes, SpeechError>>),
    Stop(RelayEnd),
}

/// Copy `upstream` into `sink` until one side finishes, then close the sink.
///
/// Cancellation and the optional deadline are checked while waiting on either
/// side, so a stalled upstream read is abandoned as soon as the token fires.
pub async fn forward_chunks<S: ChunkSink>(
    mut upstream: ByteStream,
    mut sink: S,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) -> RelayReport {
    let deadline = async move {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut chunks = 0usize;
    let mut bytes = 0u64;

    let end = loop {
        if sink.is_closed() {
            break RelayEnd::ConsumerDisconnected;
        }

        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Stop(RelayEnd::Cancelled),
            _ = &mut deadline => Step::Stop(RelayEnd::TimedOut),
            next = upstream.next() => Step::Next(next),
        };

        let chunk = match step {
            Step::Stop(end) => break end,
            Step::Next(None) => break RelayEnd::Completed,
            Step::Next(Some(Err(e))) => break RelayEnd::UpstreamFailed(e.to_string()),
            Step::Next(Some(Ok(chunk))) => chunk,
        };
        if chunk.is_empty() {
            continue;
        }

        let len = chunk.len() as u64;
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RelayEnd::Cancelled),
            _ = &mut deadline => Err(RelayEnd::TimedOut),
            res = sink.write(chunk) => res.map_err(|_| RelayEnd::ConsumerDisconnected),
        };
        if let Err(end) = written {
            break end;
        }
        chunks += 1;
        bytes += len;
    };

    // Release the upstream connection before closing the sink.
    drop(upstream);

    let report = RelayReport { chunks, bytes, end };
    match &report.end {
        RelayEnd::Completed => debug!("Relay completed: {} chunks, {} bytes", chunks, bytes),
        RelayEnd::UpstreamFailed(reason) => {
            warn!("Upstream failed after {} chunks ({} bytes): {}", chunks, bytes, reason)
        }
        other => info!("Relay stopped ({:?}) after {} chunks, {} bytes", other, chunks, bytes),
    }
    sink.close(&report).await;
    report
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Chunks that may wait between the forwarding task and the consumer.
    pub channel_capacity: usize,
    /// Upper bound on one whole relay. `None` lets it run until upstream ends.
    pub stream_timeout: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            stream_timeout: None,
        }
    }
}

/// Consumer side of a relay.
pub struct StreamHandle {
    rx: mpsc::Receiver<Bytes>,
    terminal: Option<oneshot::Receiver<SpeechError>>,
    state: watch::Receiver<RelayState>,
    _cancel: DropGuard,
}

impl StreamHandle {
    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// Watch the relay state independently of the handle's lifetime.
    pub fn state_watch(&self) -> watch::Receiver<RelayState> {
        self.state.clone()
    }
}

impl Stream for StreamHandle {
    type Item = Result<Bytes, SpeechError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => return Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(None) => {}
            Poll::Pending => return Poll::Pending,
        }
        // The data channel is drained and closed, so the sink has finished.
        let Some(terminal) = self.terminal.as_mut() else {
            return Poll::Ready(None);
        };
        let outcome = match Pin::new(terminal).poll(cx) {
            Poll::Ready(outcome) => outcome.ok(),
            Poll::Pending => return Poll::Pending,
        };
        self.terminal = None;
        Poll::Ready(outcome.map(Err))
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("state", &self.state())
            .finish()
    }
}

pub struct StreamRelay {
    provider: Arc<dyn SpeechProvider>,
    model_id: String,
    config: RelayConfig,
    observer: Arc<dyn RelayObserver>,
}

impl StreamRelay {
    pub fn new(provider: Arc<dyn SpeechProvider>) -> Self {
        Self {
            provider,
            model_id: DEFAULT_MODEL_ID.to_string(),
            config: RelayConfig::default(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RelayObserver>) -> Self {
        self.observer = observer;
        self
    }

    async fn open_upstream(&self, request: &SynthesisRequest) -> Result<ByteStream, SpeechError> {
        request.validate()?;
        let convert = ConvertRequest::from_synthesis(request, &self.model_id);
        self.provider
            .convert(&request.voice_id, &convert)
            .await
            .map_err(|e| match e {
                SpeechError::UpstreamUnavailable(_) => e,
                other => SpeechError::UpstreamUnavailable(other.to_string()),
            })
    }

    /// Start relaying `request`. Returns once the upstream stream is open.
    pub async fn relay(&self, request: SynthesisRequest) -> Result<StreamHandle, SpeechError> {
        self.relay_with_cancel(request, CancellationToken::new()).await
    }

    /// Like [`relay`](Self::relay) but stops early when `cancel` fires.
    pub async fn relay_with_cancel(
        &self,
        request: SynthesisRequest,
        cancel: CancellationToken,
    ) -> Result<StreamHandle, SpeechError> {
        let (state_tx, state_rx) = watch::channel(RelayState::Opening);
        let upstream = self.open_upstream(&request).await?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (terminal_tx, terminal_rx) = oneshot::channel();
        let sink = ChannelSink::new(tx, terminal_tx);
        let observer = self.observer.clone();
        let timeout = self.config.stream_timeout;
        let task_cancel = cancel.clone();
        let voice_id = request.voice_id;

        tokio::spawn(async move {
            state_tx.send_replace(RelayState::Forwarding);
            debug!("Relay forwarding for voice {voice_id}");
            let report = forward_chunks(upstream, sink, task_cancel, timeout).await;
            observer.on_closed(&report);
            state_tx.send_replace(RelayState::Closed);
        });

        Ok(StreamHandle {
            rx,
            terminal: Some(terminal_rx),
            state: state_rx,
            _cancel: cancel.drop_guard(),
        })
    }

    /// Read the whole upstream stream into one buffer.
    pub async fn synthesize_complete(&self, request: SynthesisRequest) -> Result<Bytes, SpeechError> {
        let mut upstream = self.open_upstream(&request).await?;
        let collect = async {
            let mut buf = BytesMut::new();
            while let Some(chunk) = upstream.next().await {
                buf.extend_from_slice(&chunk?);
            }
            Ok::<_, SpeechError>(buf.freeze())
        };
        match self.config.stream_timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.map_err(|_| {
                SpeechError::StreamInterrupted("stream deadline exceeded".to_string())
            })?,
            None => collect.await,
        }
    }
}
