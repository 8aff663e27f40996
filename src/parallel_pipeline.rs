// THEORY:
// The tracking pipeline is deliberately sequential: each frame's motion
// estimate needs the previous frame's luma, and the persistence counters
// assume frames arrive in order. Async hosts still need to drive it without
// blocking their executor, so this module parks the pipeline inside one
// dedicated worker task and funnels every frame through a bounded channel.
// Submission order is processing order, end to end.
//
// Key architectural principles:
// 1.  **One Worker, Whole Pipeline**: Exactly one task owns the
//     `TrackingPipeline`. Nothing is shared, so the hot path takes no lock.
// 2.  **Pooled Frame Buffers**: Submitting a frame copies it into a buffer
//     drawn from a small pool; the worker returns the buffer after
//     processing. A steady stream allocates nothing once the pool is warm.
// 3.  **Typed Boundary Errors**: The core never fails, but the boundary
//     can: the worker may be gone, or a buffer may not match its stated
//     dimensions. Those are the only errors, and both are recoverable.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::warn;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::PipelineConfig;
use crate::pipeline::{FrameInput, FrameReport, NativeFrame, TrackingPipeline};

const FRAME_POOL_SIZE: usize = 8;
const CHANNEL_CAPACITY: usize = 8; // submissions in flight before senders wait

/// Errors crossing the async ingestion boundary.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The worker task has stopped, either by shutdown or by panic.
    #[error("pipeline worker is no longer running")]
    WorkerGone,
    /// A submitted buffer does not match its stated dimensions.
    #[error("frame buffer holds {actual} bytes, {width}x{height} RGBA needs {expected}")]
    FrameSize { width: usize, height: usize, expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, IngestError>;

struct OwnedFrame {
    rgba: Vec<u8>,
    width: usize,
    height: usize,
    native: Option<(Vec<u8>, usize, usize)>,
    now: f64,
}

enum WorkerMessage {
    Frame { frame: OwnedFrame, reply: oneshot::Sender<FrameReport> },
    Hit { now: f64, reply: oneshot::Sender<bool> },
    SetDespawnAfter { timeout: Option<f64> },
    Reset,
    Shutdown,
}

/// Async front end for the tracking pipeline.
///
/// All methods are cancel-safe from the caller's side; a dropped submission
/// future leaves the worker processing the frame and discarding the report.
pub struct AsyncPipeline {
    sender: mpsc::Sender<WorkerMessage>,
    pool: Arc<Mutex<VecDeque<Vec<u8>>>>,
    worker: Option<tokio::task::JoinHandle<()>>,
}

impl AsyncPipeline {
    /// Spawns the worker task; must be called inside a tokio runtime.
    pub fn new(config: PipelineConfig) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let pool = Arc::new(Mutex::new(VecDeque::with_capacity(FRAME_POOL_SIZE)));
        let worker =
            tokio::spawn(run_worker(TrackingPipeline::new(config), receiver, Arc::clone(&pool)));
        Self { sender, pool, worker: Some(worker) }
    }

    /// Submits one frame and waits for its report. Frames are processed in
    /// submission order; when the queue is full this waits instead of
    /// dropping.
    pub async fn process_frame(&self, frame: FrameInput<'_>) -> Result<FrameReport> {
        check_frame_size(frame.rgba, frame.width, frame.height)?;
        if let Some(native) = &frame.native {
            check_frame_size(native.rgba, native.width, native.height)?;
        }

        let owned = OwnedFrame {
            rgba: self.pooled_copy(frame.rgba),
            width: frame.width,
            height: frame.height,
            native: frame.native.map(|n| (self.pooled_copy(n.rgba), n.width, n.height)),
            now: frame.now,
        };
        let (reply, response) = oneshot::channel();
        self.sender
            .send(WorkerMessage::Frame { frame: owned, reply })
            .await
            .map_err(|_| IngestError::WorkerGone)?;
        response.await.map_err(|_| IngestError::WorkerGone)
    }

    /// Reports a successful shot. Resolves to true when a respawn was
    /// scheduled.
    pub async fn register_hit(&self, now: f64) -> Result<bool> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(WorkerMessage::Hit { now, reply })
            .await
            .map_err(|_| IngestError::WorkerGone)?;
        response.await.map_err(|_| IngestError::WorkerGone)
    }

    /// Adjusts the despawn timeout for subsequent frames.
    pub async fn set_despawn_after(&self, timeout: Option<f64>) -> Result<()> {
        self.sender
            .send(WorkerMessage::SetDespawnAfter { timeout })
            .await
            .map_err(|_| IngestError::WorkerGone)
    }

    /// Clears all tracking state for a new session.
    pub async fn reset(&self) -> Result<()> {
        self.sender.send(WorkerMessage::Reset).await.map_err(|_| IngestError::WorkerGone)
    }

    /// Stops the worker after the queue drains. Later calls on this handle
    /// return [`IngestError::WorkerGone`].
    pub async fn shutdown(&mut self) {
        let _ = self.sender.send(WorkerMessage::Shutdown).await;
        if let Some(worker) = self.worker.take() {
            if worker.await.is_err() {
                warn!("pipeline worker ended with a panic");
            }
        }
    }

    fn pooled_copy(&self, data: &[u8]) -> Vec<u8> {
        let mut buffer = {
            let mut pool = self.pool.lock().unwrap();
            pool.pop_front().unwrap_or_default()
        };
        buffer.clear();
        buffer.extend_from_slice(data);
        buffer
    }
}

impl Drop for AsyncPipeline {
    fn drop(&mut self) {
        // Best effort; an explicit shutdown() has already cleared the handle.
        if self.worker.is_some() {
            let _ = self.sender.try_send(WorkerMessage::Shutdown);
        }
    }
}

fn check_frame_size(rgba: &[u8], width: usize, height: usize) -> Result<()> {
    let expected = width * height * 4;
    if rgba.len() != expected {
        return Err(IngestError::FrameSize { width, height, expected, actual: rgba.len() });
    }
    Ok(())
}

async fn run_worker(
    mut pipeline: TrackingPipeline,
    mut receiver: mpsc::Receiver<WorkerMessage>,
    pool: Arc<Mutex<VecDeque<Vec<u8>>>>,
) {
    while let Some(message) = receiver.recv().await {
        match message {
            WorkerMessage::Frame { frame, reply } => {
                let native = frame.native.as_ref().map(|(rgba, width, height)| NativeFrame {
                    rgba: rgba.as_slice(),
                    width: *width,
                    height: *height,
                });
                let report = pipeline.process_frame(FrameInput {
                    rgba: &frame.rgba,
                    width: frame.width,
                    height: frame.height,
                    native,
                    now: frame.now,
                });
                recycle(&pool, frame.rgba);
                if let Some((rgba, _, _)) = frame.native {
                    recycle(&pool, rgba);
                }
                if reply.send(report).is_err() {
                    warn!("frame report discarded; the submitter went away");
                }
            }
            WorkerMessage::Hit { now, reply } => {
                let _ = reply.send(pipeline.register_hit(now));
            }
            WorkerMessage::SetDespawnAfter { timeout } => pipeline.set_despawn_after(timeout),
            WorkerMessage::Reset => pipeline.reset(),
            WorkerMessage::Shutdown => break,
        }
    }
}

fn recycle(pool: &Mutex<VecDeque<Vec<u8>>>, buffer: Vec<u8>) {
    let mut pool = pool.lock().unwrap();
    if pool.len() < FRAME_POOL_SIZE {
        pool.push_back(buffer);
    }
}
