//! Background preprocessing thread.
//!
//! Requests go in and responses come out over crossbeam channels; the thread
//! shares no state with its caller beyond the cancellation token of the
//! fetch in flight. Fetches run on a small current-thread tokio runtime
//! owned by the worker thread and are bounded by a timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::timing::{calculate_absolute_timestamps, snap_to_frame};
use crate::error::WorkerError;
use crate::fetch::{fetch_with_deadline, Fetcher};
use crate::worker::extractor::FrameExtractor;
use crate::worker::protocol::{
    CalculateTransitions, DecodedFrame, ExtractFrames, PreloadClip, Progress, RequestBody,
    RequestId, ResponseBody, WorkerOutput, WorkerRequest, WorkerResponse,
};

/// State owned by the worker thread
struct WorkerState {
    fetcher: Arc<dyn Fetcher>,
    extractor: Box<dyn FrameExtractor>,
    runtime: tokio::runtime::Runtime,
    fetch_timeout: Duration,
    stopping: CancellationToken,
    in_flight: Arc<Mutex<CancellationToken>>,
    blobs: HashMap<String, Arc<Vec<u8>>>,
    frames: HashMap<String, Vec<DecodedFrame>>,
    responses: Sender<WorkerResponse>,
}

impl WorkerState {
    fn respond(&self, id: RequestId, body: ResponseBody) {
        // Receiver gone means the handle was dropped; nothing left to tell.
        let _ = self.responses.send(WorkerResponse { id, body });
    }

    fn progress(&self, id: RequestId, progress: f32, stage: &str) {
        self.respond(
            id,
            ResponseBody::Progress(Progress {
                progress,
                stage: stage.to_string(),
            }),
        );
    }

    fn handle(&mut self, request: WorkerRequest) {
        let id = request.id;
        let result = match request.body {
            RequestBody::PreloadClip(preload) => self.preload(id, preload),
            RequestBody::ExtractFrames(extract) => self.extract(id, extract),
            RequestBody::CalculateTransitions(calculate) => Ok(calculate_transitions(calculate)),
            RequestBody::Dispose => Ok(self.dispose()),
        };

        match result {
            Ok(output) => self.respond(id, ResponseBody::Success(output)),
            Err(message) => {
                warn!(id, %message, "worker request failed");
                self.respond(id, ResponseBody::Error { message });
            }
        }
    }

    fn fetch(&mut self, id: RequestId, clip_id: &str, url: &str) -> Result<Arc<Vec<u8>>, String> {
        let cancel = self.stopping.child_token();
        *self.in_flight.lock() = cancel.clone();
        self.progress(id, 0.0, "fetching");

        let bytes = self
            .runtime
            .block_on(fetch_with_deadline(
                self.fetcher.as_ref(),
                url,
                self.fetch_timeout,
                &cancel,
            ))
            .map_err(|e| e.to_string())?;
        let bytes = Arc::new(bytes);
        self.blobs.insert(clip_id.to_string(), Arc::clone(&bytes));
        self.progress(id, 1.0, "fetched");
        Ok(bytes)
    }

    fn preload(&mut self, id: RequestId, preload: PreloadClip) -> Result<WorkerOutput, String> {
        if let Some(bytes) = self.blobs.get(&preload.clip_id) {
            return Ok(WorkerOutput::Preloaded {
                clip_id: preload.clip_id,
                bytes: bytes.len(),
                cached: true,
            });
        }

        let bytes = self.fetch(id, &preload.clip_id, &preload.url)?;
        debug!(clip_id = %preload.clip_id, bytes = bytes.len(), "clip preloaded");
        Ok(WorkerOutput::Preloaded {
            clip_id: preload.clip_id,
            bytes: bytes.len(),
            cached: false,
        })
    }

    fn extract(&mut self, id: RequestId, extract: ExtractFrames) -> Result<WorkerOutput, String> {
        if !self.extractor.is_supported() {
            info!(clip_id = %extract.clip_id, "frame extraction unsupported; caller falls back");
            return Ok(WorkerOutput::Frames {
                clip_id: extract.clip_id,
                frames: Vec::new(),
                fallback: true,
            });
        }

        let cached = self.blobs.get(&extract.clip_id).cloned();
        let bytes = match (cached, extract.url.as_deref()) {
            (Some(bytes), _) => bytes,
            (None, Some(url)) => self.fetch(id, &extract.clip_id, url)?,
            (None, None) => return Err(format!("clip {} is not preloaded", extract.clip_id)),
        };

        let frames = self.extractor.extract(&bytes, &extract.timestamps)?;
        self.frames
            .entry(extract.clip_id.clone())
            .or_default()
            .extend(frames.iter().cloned());

        Ok(WorkerOutput::Frames {
            clip_id: extract.clip_id,
            frames,
            fallback: false,
        })
    }

    fn dispose(&mut self) -> WorkerOutput {
        let blobs = self.blobs.len();
        let frames = self.frames.values().map(Vec::len).sum();
        self.blobs.clear();
        self.frames.clear();
        debug!(blobs, frames, "worker caches released");
        WorkerOutput::Disposed { blobs, frames }
    }
}

fn calculate_transitions(calculate: CalculateTransitions) -> WorkerOutput {
    let timestamps = calculate_absolute_timestamps(calculate.durations.iter().copied());
    let snapped = timestamps
        .iter()
        .map(|start| snap_to_frame(*start, calculate.fps))
        .collect();
    WorkerOutput::Transitions {
        total_duration: calculate.durations.iter().sum(),
        timestamps,
        snapped,
    }
}

/// Handle to the preprocessing thread. Dropping it stops the thread.
pub struct PreprocessWorker {
    requests: Option<Sender<WorkerRequest>>,
    responses: Receiver<WorkerResponse>,
    next_id: AtomicU64,
    stopping: CancellationToken,
    in_flight: Arc<Mutex<CancellationToken>>,
    thread: Option<JoinHandle<()>>,
}

impl PreprocessWorker {
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn spawn(
        fetcher: Arc<dyn Fetcher>,
        extractor: Box<dyn FrameExtractor>,
    ) -> Result<Self, WorkerError> {
        Self::spawn_with_timeout(fetcher, extractor, Self::DEFAULT_FETCH_TIMEOUT)
    }

    /// Spawn with each fetch bounded by `fetch_timeout`
    pub fn spawn_with_timeout(
        fetcher: Arc<dyn Fetcher>,
        extractor: Box<dyn FrameExtractor>,
        fetch_timeout: Duration,
    ) -> Result<Self, WorkerError> {
        let stopping = CancellationToken::new();
        let in_flight = Arc::new(Mutex::new(stopping.child_token()));
        let worker_stopping = stopping.clone();
        let worker_in_flight = Arc::clone(&in_flight);
        let (request_tx, request_rx) = channel::unbounded::<WorkerRequest>();
        let (response_tx, response_rx) = channel::unbounded::<WorkerResponse>();

        let thread = thread::Builder::new()
            .name("reelsync-preprocess".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!(error = %err, "worker runtime failed to start");
                        return;
                    }
                };

                let mut state = WorkerState {
                    fetcher,
                    extractor,
                    runtime,
                    fetch_timeout,
                    stopping: worker_stopping,
                    in_flight: worker_in_flight,
                    blobs: HashMap::new(),
                    frames: HashMap::new(),
                    responses: response_tx,
                };
                for request in request_rx.iter() {
                    state.handle(request);
                }
                debug!("preprocess worker exiting");
            })?;

        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            next_id: AtomicU64::new(1),
            stopping,
            in_flight,
            thread: Some(thread),
        })
    }

    /// Queue a request; returns its id
    pub fn send(&self, body: RequestBody) -> Result<RequestId, WorkerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.requests
            .as_ref()
            .ok_or(WorkerError::Stopped)?
            .send(WorkerRequest { id, body })
            .map_err(|_| WorkerError::Stopped)?;
        Ok(id)
    }

    /// All responses, in the order the worker produced them
    pub fn responses(&self) -> &Receiver<WorkerResponse> {
        &self.responses
    }

    /// Send `body` and wait for its SUCCESS or ERROR.
    ///
    /// Progress events and responses to other requests that arrive
    /// meanwhile are discarded; pipeline with `send` and `responses` instead.
    pub fn request(&self, body: RequestBody, timeout: Duration) -> Result<WorkerResponse, WorkerError> {
        let id = self.send(body)?;
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) if response.id == id && response.is_final() => return Ok(response),
                Ok(response) => {
                    debug!(id = response.id, "skipping worker response while waiting for {}", id);
                }
                Err(RecvTimeoutError::Timeout) => return Err(WorkerError::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => return Err(WorkerError::Stopped),
            }
        }
    }

    /// Abort the fetch currently in flight, if any.
    ///
    /// The request it belongs to answers with an ERROR; queued requests run normally.
    pub fn cancel_fetch(&self) {
        self.in_flight.lock().cancel();
    }

    /// Stop accepting requests and join the thread after it drains its queue.
    /// Fetches still pending or queued fail as cancelled.
    pub fn shutdown(&mut self) {
        self.requests.take();
        self.stopping.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("preprocess worker panicked");
            }
        }
    }
}

impl Drop for PreprocessWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
