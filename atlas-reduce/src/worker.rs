//! Compute worker: runs one reduction at a time on a blocking thread.

use crate::config::WorkerConfig;
use crate::protocol::{InputMessage, OutputMessage};
use atlas::{Error, Result};
use atlas_core::{reduce_records, ProgressScheduler, ReductionFrame};
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

/// Shared between a submission, its worker thread and the worker.
#[derive(Debug)]
struct RequestState {
    /// Flips to `true` once; the worker thread waits on it while blocked
    /// on a full channel.
    cancelled: watch::Sender<bool>,
    finished: AtomicBool,
}

impl RequestState {
    fn new() -> Self {
        Self {
            cancelled: watch::channel(false).0,
            finished: AtomicBool::new(false),
        }
    }

    /// Returns `true` for the call that actually cancelled.
    fn cancel(&self) -> bool {
        self.cancelled.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.is_finished()
    }
}

struct ActiveRequest {
    id: u64,
    state: Arc<RequestState>,
}

/// Owns at most one in-flight reduction request.
///
/// `submit` must be called from within a tokio runtime.
pub struct ComputeWorker {
    config: WorkerConfig,
    active: Mutex<Option<ActiveRequest>>,
    next_id: AtomicU64,
}

impl ComputeWorker {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Whether a submitted request is still computing.
    pub fn is_busy(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map_or(false, |active| active.state.is_active())
    }

    /// Start `request`, cancelling any request still in flight.
    pub fn submit(&self, request: InputMessage) -> Submission {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(RequestState::new());

        let previous = self.active.lock().replace(ActiveRequest {
            id,
            state: Arc::clone(&state),
        });
        if let Some(previous) = previous {
            if previous.state.is_active() && previous.state.cancel() {
                warn!("Request {} replaced by request {}", previous.id, id);
            }
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let scheduler = self.config.scheduler();
        let worker_state = Arc::clone(&state);
        let handle = tokio::task::spawn_blocking(move || {
            run(id, request, scheduler, tx, &worker_state);
            worker_state.finished.store(true, Ordering::SeqCst);
        });

        Submission {
            id,
            stream: ReceiverStream::new(rx),
            state,
            handle: Some(handle),
        }
    }
}

impl Default for ComputeWorker {
    fn default() -> Self {
        Self::new(WorkerConfig::default())
    }
}

/// Hand `message` to the receiver, waiting for channel space unless the
/// request is cancelled first. Returns `false` when the thread should stop.
fn deliver(
    runtime: &Handle,
    tx: &mpsc::Sender<OutputMessage>,
    cancelled: &mut watch::Receiver<bool>,
    message: OutputMessage,
) -> bool {
    runtime.block_on(async {
        tokio::select! {
            sent = tx.send(message) => sent.is_ok(),
            _ = cancelled.wait_for(|&c| c) => false,
        }
    })
}

fn run(
    id: u64,
    request: InputMessage,
    scheduler: ProgressScheduler,
    tx: mpsc::Sender<OutputMessage>,
    state: &RequestState,
) {
    let start = Instant::now();
    let runtime = Handle::current();
    let mut cancelled = state.cancelled.subscribe();
    let InputMessage { params, result } = request;

    let frames = match reduce_records(&result.points, &params, scheduler) {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Request {} rejected: {}", id, e);
            deliver(&runtime, &tx, &mut cancelled, OutputMessage::error(&e));
            return;
        }
    };
    info!(
        "Request {}: reducing {} points with {}",
        id,
        result.points.len(),
        frames.algorithm()
    );

    for frame in frames {
        if state.is_cancelled() {
            debug!("Request {} cancelled after {:?}", id, start.elapsed());
            return;
        }
        let is_final = frame.is_final;
        if !deliver(&runtime, &tx, &mut cancelled, OutputMessage::from(frame)) {
            debug!("Request {} stopped before delivery", id);
            return;
        }
        if is_final {
            info!(
                "Request {} finished in {} ms",
                id,
                start.elapsed().as_millis()
            );
        }
    }
}

/// Handle to one submitted request.
///
/// Yields output messages in iteration order and ends after the terminal
/// one. Cancelling or dropping it discards everything not yet received and
/// releases the worker thread at its next emission.
pub struct Submission {
    id: u64,
    stream: ReceiverStream<OutputMessage>,
    state: Arc<RequestState>,
    handle: Option<JoinHandle<()>>,
}

impl Submission {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        if self.state.cancel() {
            debug!("Request {} cancelled", self.id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Whether the worker thread behind this submission has exited.
    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Consume the submission, invoking `on_frame` per frame and
    /// `on_error` for a rejected request.
    ///
    /// Fails only when the worker thread itself died.
    pub async fn drive<F, E>(mut self, mut on_frame: F, mut on_error: E) -> Result<()>
    where
        F: FnMut(ReductionFrame),
        E: FnMut(String),
    {
        while let Some(message) = self.next().await {
            match message {
                OutputMessage::Frame {
                    result, is_final, ..
                } => on_frame(ReductionFrame {
                    points: result,
                    is_final,
                }),
                OutputMessage::Error { error, .. } => on_error(error),
            }
        }

        if self.is_cancelled() {
            return Ok(());
        }
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| Error::Worker(format!("request {}: {}", self.id, e))),
            None => Ok(()),
        }
    }
}

impl Stream for Submission {
    type Item = OutputMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.state.is_cancelled() {
            self.stream.close();
            return Poll::Ready(None);
        }
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl Drop for Submission {
    fn drop(&mut self) {
        self.state.cancel();
    }
}
