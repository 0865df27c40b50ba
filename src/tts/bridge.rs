//! Blocking, pull-based delivery of an asynchronous audio stream.
//!
//! A [`StreamBridge`] owns one dedicated worker thread that drives a provider stream on a
//! tokio runtime and pushes [`StreamEvent`]s into a bounded FIFO queue. The consumer pulls
//! from the queue through the [`Iterator`] impl with a per-item wait budget.
//!
//! ```text
//!   Idle --start--> Streaming --Done-----> Complete
//!                             --Error----> Error
//!                             --no event-> TimedOut
//!                             --cancel---> Cancelled
//! ```

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{Result, TtsError};

/// Unit of communication between the worker and the consumer.
///
/// Exactly one `Done` or `Error` ends a stream; nothing follows it.
#[derive(Debug)]
pub enum StreamEvent {
    Chunk(Bytes),
    Done,
    Error(TtsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Streaming,
    Complete,
    Error,
    TimedOut,
    Cancelled,
}

impl BridgeState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BridgeState::Idle | BridgeState::Streaming)
    }
}

/// Bridge tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub item_timeout: Duration,  // Longest wait for any single event
    pub join_grace: Duration,    // How long to wait for the worker to exit
    pub queue_capacity: usize,   // Bounded queue depth between worker and consumer
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self { item_timeout: Duration::from_secs(30), join_grace: Duration::from_secs(1), queue_capacity: 32 }
    }
}

/// Delivery statistics for one bridged stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub chunks: usize,
    pub bytes: usize,
    pub first_chunk_latency: Option<Duration>,
    pub elapsed: Duration,
}

/// Single-use synchronous adapter over an asynchronous audio stream.
///
/// The runtime behind `handle` must be multi-threaded; the worker thread calls
/// [`Handle::block_on`], which cannot drive I/O on a current-thread runtime.
/// Dropping the bridge cancels the worker and joins it within the grace period.
pub struct StreamBridge {
    handle: Handle,
    settings: BridgeSettings,
    state: BridgeState,
    receiver: Option<Receiver<StreamEvent>>,
    worker: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    stats: StreamStats,
    started: Option<Instant>,
}

impl StreamBridge {
    pub fn new(handle: Handle, settings: BridgeSettings) -> Self {
        Self {
            handle,
            settings,
            state: BridgeState::Idle,
            receiver: None,
            worker: None,
            cancel: CancellationToken::new(),
            stats: StreamStats::default(),
            started: None,
        }
    }

    /// Use `token` for cancellation, typically a child of a caller-wide token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Create a bridge and start it on `stream`.
    pub fn spawn<S>(handle: Handle, settings: BridgeSettings, stream: S) -> Result<Self>
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        let mut bridge = Self::new(handle, settings);
        bridge.start(stream)?;
        Ok(bridge)
    }

    /// Start the worker. A bridge can only be started once.
    pub fn start<S>(&mut self, stream: S) -> Result<()>
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        if self.state != BridgeState::Idle {
            return Err(TtsError::validation("stream bridge has already been started"));
        }

        let (sender, receiver) = mpsc::sync_channel::<StreamEvent>(self.settings.queue_capacity);
        let handle = self.handle.clone();
        let cancel = self.cancel.clone();

        let worker = std::thread::Builder::new()
            .name("tts-stream".to_string())
            .spawn(move || handle.block_on(drive(stream, sender, cancel)))
            .map_err(|e| TtsError::configuration(format!("failed to spawn stream worker: {}", e)))?;

        self.receiver = Some(receiver);
        self.worker = Some(worker);
        self.started = Some(Instant::now());
        self.state = BridgeState::Streaming;
        Ok(())
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Ask the worker to stop its upstream fetch. The next pull reports [`TtsError::Cancelled`]
    /// unless events were already queued.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Move to a terminal state, release the queue and reclaim the worker.
    fn finish(&mut self, state: BridgeState) {
        self.state = state;
        self.stats.elapsed = self.elapsed();
        self.receiver = None;
        self.cancel.cancel();

        let Some(worker) = self.worker.take() else {
            return;
        };

        let deadline = Instant::now() + self.settings.join_grace;
        while !worker.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        if worker.is_finished() {
            if let Err(e) = worker.join() {
                warn!("Stream worker panicked: {:?}", e);
            }
        } else {
            warn!("Stream worker didn't exit within {:?}, abandoning it", self.settings.join_grace);
        }
    }
}

/// Worker body: forward stream items into the queue until the stream ends, fails or is cancelled.
async fn drive<S>(stream: S, sender: SyncSender<StreamEvent>, cancel: CancellationToken)
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let mut stream = Box::pin(stream);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Stream worker cancelled");
                return;
            }
            next = stream.next() => next,
        };

        let (event, last) = match next {
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => (StreamEvent::Chunk(chunk), false),
            Some(Err(e)) => (StreamEvent::Error(e), true),
            None => (StreamEvent::Done, true),
        };

        // A send error means the consumer is gone; nobody is left to tell.
        if sender.send(event).is_err() {
            debug!("Stream consumer went away, stopping worker");
            return;
        }
        if last {
            return;
        }
    }
}

impl Iterator for StreamBridge {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != BridgeState::Streaming {
            return None;
        }
        let receiver = self.receiver.as_ref()?;

        match receiver.recv_timeout(self.settings.item_timeout) {
            Ok(StreamEvent::Chunk(chunk)) => {
                if self.stats.chunks == 0 {
                    let latency = self.elapsed();
                    self.stats.first_chunk_latency = Some(latency);
                    debug!("First audio chunk after {:?} ({} bytes)", latency, chunk.len());
                }
                self.stats.chunks += 1;
                self.stats.bytes += chunk.len();
                Some(Ok(chunk))
            }
            Ok(StreamEvent::Done) => {
                self.finish(BridgeState::Complete);
                info!("Stream complete: {} chunks, {} bytes in {:?}", self.stats.chunks, self.stats.bytes, self.stats.elapsed);
                None
            }
            Ok(StreamEvent::Error(e)) => {
                self.finish(BridgeState::Error);
                warn!("Stream failed after {} chunks: {}", self.stats.chunks, e);
                Some(Err(e))
            }
            Err(RecvTimeoutError::Timeout) => {
                let waited = self.settings.item_timeout;
                self.finish(BridgeState::TimedOut);
                warn!("No audio within {:?} after {} chunks, giving up", waited, self.stats.chunks);
                Some(Err(TtsError::Timeout { waited }))
            }
            Err(RecvTimeoutError::Disconnected) => {
                if self.cancel.is_cancelled() {
                    self.finish(BridgeState::Cancelled);
                    debug!("Stream cancelled after {} chunks", self.stats.chunks);
                    Some(Err(TtsError::Cancelled))
                } else {
                    self.finish(BridgeState::Error);
                    Some(Err(TtsError::WorkerLost))
                }
            }
        }
    }
}

impl Drop for StreamBridge {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let state = if self.state == BridgeState::Streaming { BridgeState::Cancelled } else { self.state };
            self.finish(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Runtime;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_multi_thread().worker_threads(2).enable_all().build().unwrap()
    }

    fn quick() -> BridgeSettings {
        BridgeSettings { item_timeout: Duration::from_millis(200), join_grace: Duration::from_millis(500), queue_capacity: 4 }
    }

    #[test]
    fn test_chunks_arrive_in_order() {
        let rt = runtime();
        let producer = async_stream::stream! {
            for part in ["a", "bb", "ccc"] {
                tokio::task::yield_now().await;
                yield Ok::<_, TtsError>(Bytes::from_static(part.as_bytes()));
            }
        };
        let mut bridge = StreamBridge::spawn(rt.handle().clone(), BridgeSettings::default(), producer).unwrap();

        let received: Vec<Bytes> = bridge.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(received, vec![Bytes::from_static(b"a"), Bytes::from_static(b"bb"), Bytes::from_static(b"ccc")]);
        assert_eq!(bridge.state(), BridgeState::Complete);
        assert_eq!(bridge.stats().chunks, 3);
        assert_eq!(bridge.stats().bytes, 6);
        assert!(bridge.stats().first_chunk_latency.is_some());
        assert!(bridge.next().is_none());
    }

    #[test]
    fn test_error_after_first_chunk() {
        let rt = runtime();
        let producer = async_stream::stream! {
            yield Ok(Bytes::from_static(b"first"));
            yield Err(TtsError::Upstream { provider: "mock", status: 500, message: "boom".into() });
        };
        let mut bridge = StreamBridge::spawn(rt.handle().clone(), quick(), producer).unwrap();

        assert_eq!(bridge.next().unwrap().unwrap(), Bytes::from_static(b"first"));
        assert!(matches!(bridge.next(), Some(Err(TtsError::Upstream { status: 500, .. }))));
        assert!(bridge.next().is_none());
        assert_eq!(bridge.state(), BridgeState::Error);
    }

    #[test]
    fn test_empty_chunks_are_not_delivered() {
        let rt = runtime();
        let producer = async_stream::stream! {
            yield Ok::<_, TtsError>(Bytes::new());
            yield Ok(Bytes::from_static(b"x"));
            yield Ok(Bytes::new());
        };
        let bridge = StreamBridge::spawn(rt.handle().clone(), quick(), producer).unwrap();
        let received: Vec<Bytes> = bridge.collect::<Result<_>>().unwrap();
        assert_eq!(received, vec![Bytes::from_static(b"x")]);
    }

    #[test]
    fn test_slow_producer_times_out() {
        let rt = runtime();
        let producer = async_stream::stream! {
            yield Ok::<_, TtsError>(Bytes::from_static(b"early"));
            tokio::time::sleep(Duration::from_secs(10)).await;
            yield Ok(Bytes::from_static(b"late"));
        };
        let mut bridge = StreamBridge::spawn(rt.handle().clone(), quick(), producer).unwrap();

        assert!(bridge.next().unwrap().is_ok());
        let started = Instant::now();
        assert!(matches!(bridge.next(), Some(Err(TtsError::Timeout { .. }))));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(bridge.state(), BridgeState::TimedOut);
        assert!(bridge.next().is_none());
    }

    #[test]
    fn test_cancel_stops_pending_worker() {
        let rt = runtime();
        let producer = futures_util::stream::pending::<Result<Bytes>>();
        let settings = BridgeSettings { item_timeout: Duration::from_secs(5), ..quick() };
        let mut bridge = StreamBridge::spawn(rt.handle().clone(), settings, producer).unwrap();

        bridge.cancel();
        let started = Instant::now();
        assert!(matches!(bridge.next(), Some(Err(TtsError::Cancelled))));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(bridge.state(), BridgeState::Cancelled);
    }

    #[test]
    fn test_drop_mid_stream_returns_promptly() {
        let rt = runtime();
        let producer = async_stream::stream! {
            loop {
                yield Ok::<_, TtsError>(Bytes::from_static(b"tick"));
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        let mut bridge = StreamBridge::spawn(rt.handle().clone(), quick(), producer).unwrap();
        assert!(bridge.next().unwrap().is_ok());

        let started = Instant::now();
        drop(bridge);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_bridge_is_single_use() {
        let rt = runtime();
        let mut bridge = StreamBridge::new(rt.handle().clone(), quick());
        assert_eq!(bridge.state(), BridgeState::Idle);
        bridge.start(futures_util::stream::empty()).unwrap();
        assert!(matches!(bridge.start(futures_util::stream::empty()), Err(TtsError::Validation(_))));
        assert!(bridge.next().is_none());
        assert_eq!(bridge.state(), BridgeState::Complete);
    }
}
