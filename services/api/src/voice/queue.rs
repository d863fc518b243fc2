//! FIFO frame buffers shared between the relay tasks.

use medvoice_core::AudioFrame;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// An async FIFO queue of audio frames with an optional capacity bound.
///
/// The inbound (client→upstream) queue is bounded so a slow upstream
/// throttles audio capture instead of growing without limit; the outbound
/// queue is unbounded and supports `drain` for barge-in. Designed for one
/// producer and one consumer task, plus occasional `drain` calls from a
/// third.
pub struct FrameQueue {
    frames: Mutex<VecDeque<AudioFrame>>,
    capacity: Option<usize>,
    /// Signalled when a frame is enqueued.
    pushed: Notify,
    /// Signalled when capacity frees up.
    popped: Notify,
}

impl FrameQueue {
    pub fn bounded(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            capacity: Some(capacity),
            pushed: Notify::new(),
            popped: Notify::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            capacity: None,
            pushed: Notify::new(),
            popped: Notify::new(),
        }
    }

    /// Enqueues a frame, waiting for space if the queue is at capacity.
    pub async fn push(&self, frame: AudioFrame) {
        let mut frame = Some(frame);
        loop {
            // Register interest before checking, so a pop between the
            // check and the await cannot be missed.
            let notified = self.popped.notified();
            {
                let mut frames = match self.frames.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if self.capacity.is_none_or(|cap| frames.len() < cap) {
                    if let Some(frame) = frame.take() {
                        frames.push_back(frame);
                        self.pushed.notify_one();
                        return;
                    }
                }
            }
            notified.await;
        }
    }

    /// Dequeues the oldest frame, waiting until one is available.
    pub async fn pop(&self) -> AudioFrame {
        loop {
            let notified = self.pushed.notified();
            {
                let mut frames = match self.frames.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Some(frame) = frames.pop_front() {
                    self.popped.notify_one();
                    return frame;
                }
            }
            notified.await;
        }
    }

    /// Discards every buffered frame and returns how many were dropped.
    pub fn drain(&self) -> usize {
        let mut frames = match self.frames.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let cleared = frames.len();
        frames.clear();
        self.popped.notify_waiters();
        cleared
    }

    pub fn len(&self) -> usize {
        match self.frames.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
