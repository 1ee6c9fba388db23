//! Buffer queue shared between an endpoint and its client.
//!
//! Buffers move by value: the client owns FREE buffers, the queue owns QUEUED
//! ones, whichever thread popped a buffer owns it while ACTIVE, and completed
//! (DONE or ERROR) buffers wait in the completion channel until the client
//! dequeues them. The queue lock is held only to push or pop, never across a
//! payload copy.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::format::Field;
use crate::pipeline::sync::lock;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Lifecycle state of a queue buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    Free,
    Queued,
    Active,
    Done,
    Error,
}

impl BufferState {
    pub fn is_completed(self) -> bool {
        matches!(self, BufferState::Done | BufferState::Error)
    }
}

/// A client buffer.
#[derive(Debug, Clone)]
pub struct QueueBuffer {
    index: u32,
    state: BufferState,
    /// Payload region; its length is the buffer size.
    pub data: Vec<u8>,
    /// Bytes of `data` holding the frame.
    pub bytes_used: usize,
    pub sequence: u32,
    /// Monotonic time since the stream started.
    pub timestamp: Duration,
    pub field: Field,
}

impl QueueBuffer {
    pub fn new(index: u32, size: usize) -> Self {
        Self {
            index,
            state: BufferState::Free,
            data: vec![0; size],
            bytes_used: 0,
            sequence: 0,
            timestamp: Duration::ZERO,
            field: Field::None,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Frame bytes of a completed buffer.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.bytes_used.min(self.data.len())]
    }
}

/// Counters kept by a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub activated: u64,
    pub completed: u64,
    pub errored: u64,
    /// Frames that arrived while no buffer was queued.
    pub starved: u64,
}

#[derive(Default)]
struct AtomicQueueStats {
    submitted: AtomicU64,
    activated: AtomicU64,
    completed: AtomicU64,
    errored: AtomicU64,
    starved: AtomicU64,
}

/// Ordered queue of client buffers plus the completion channel.
pub struct BufferQueue {
    queued: Mutex<VecDeque<QueueBuffer>>,
    done_tx: Sender<QueueBuffer>,
    done_rx: Receiver<QueueBuffer>,
    /// Negotiated image size; smaller buffers are rejected.
    min_size: AtomicUsize,
    next_index: AtomicU32,
    streaming: AtomicBool,
    stats: AtomicQueueStats,
}

impl BufferQueue {
    pub fn new(min_size: usize) -> Self {
        let (done_tx, done_rx) = unbounded();
        Self {
            queued: Mutex::new(VecDeque::new()),
            done_tx,
            done_rx,
            min_size: AtomicUsize::new(min_size),
            next_index: AtomicU32::new(0),
            streaming: AtomicBool::new(false),
            stats: AtomicQueueStats::default(),
        }
    }

    pub fn min_size(&self) -> usize {
        self.min_size.load(Ordering::Acquire)
    }

    pub(crate) fn set_min_size(&self, size: usize) {
        self.min_size.store(size, Ordering::Release);
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub(crate) fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::Release);
    }

    /// Allocate `count` FREE buffers sized for the negotiated format.
    pub fn allocate(&self, count: usize) -> Vec<QueueBuffer> {
        let size = self.min_size();
        (0..count)
            .map(|_| QueueBuffer::new(self.next_index.fetch_add(1, Ordering::Relaxed), size))
            .collect()
    }

    /// Append a buffer to the tail. Undersized buffers complete in ERROR
    /// straight away and come back through [`BufferQueue::dequeue`].
    pub fn submit(&self, mut buffer: QueueBuffer) -> PipelineResult<()> {
        let required = self.min_size();
        if buffer.data.len() < required {
            let err = PipelineError::BufferTooSmall {
                index: buffer.index,
                size: buffer.data.len(),
                required,
            };
            tracing::warn!("{}", err);
            buffer.bytes_used = 0;
            self.complete(buffer, BufferState::Error);
            return Err(err);
        }

        buffer.state = BufferState::Queued;
        buffer.bytes_used = 0;
        lock(&self.queued).push_back(buffer);
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Pop the head buffer and mark it ACTIVE.
    pub fn pop_active(&self) -> Option<QueueBuffer> {
        let popped = lock(&self.queued).pop_front();
        match popped {
            Some(mut buffer) => {
                buffer.state = BufferState::Active;
                self.stats.activated.fetch_add(1, Ordering::Relaxed);
                Some(buffer)
            }
            None => {
                self.stats.starved.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Hand a buffer back to the client in `state` (DONE or ERROR).
    pub fn complete(&self, mut buffer: QueueBuffer, state: BufferState) {
        debug_assert!(state.is_completed());
        buffer.state = state;
        match state {
            BufferState::Error => self.stats.errored.fetch_add(1, Ordering::Relaxed),
            _ => self.stats.completed.fetch_add(1, Ordering::Relaxed),
        };
        // The receiver lives in `self`, so the channel cannot be disconnected
        let _ = self.done_tx.send(buffer);
    }

    /// Complete every queued buffer in `state`, in queue order.
    pub fn flush(&self, state: BufferState) -> usize {
        let drained: Vec<QueueBuffer> = lock(&self.queued).drain(..).collect();
        let count = drained.len();
        for buffer in drained {
            self.complete(buffer, state);
        }
        count
    }

    /// Next completed buffer, waiting up to `timeout`.
    pub fn dequeue(&self, timeout: Duration) -> Option<QueueBuffer> {
        self.done_rx.recv_timeout(timeout).ok()
    }

    pub fn try_dequeue(&self) -> Option<QueueBuffer> {
        self.done_rx.try_recv().ok()
    }

    /// Number of QUEUED buffers.
    pub fn queued_len(&self) -> usize {
        lock(&self.queued).len()
    }

    /// Number of completed buffers waiting for the client.
    pub fn completed_len(&self) -> usize {
        self.done_rx.len()
    }

    /// States of the queued buffers, head first.
    pub fn queued_states(&self) -> Vec<BufferState> {
        lock(&self.queued).iter().map(|b| b.state).collect()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            activated: self.stats.activated.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            errored: self.stats.errored.load(Ordering::Relaxed),
            starved: self.stats.starved.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_submit_and_pop_in_order() {
        let queue = BufferQueue::new(16);
        for buffer in queue.allocate(3) {
            assert_eq!(buffer.state(), BufferState::Free);
            queue.submit(buffer).unwrap();
        }
        assert_eq!(queue.queued_len(), 3);
        assert!(queue
            .queued_states()
            .iter()
            .all(|s| *s == BufferState::Queued));

        let head = queue.pop_active().unwrap();
        assert_eq!(head.index(), 0);
        assert_eq!(head.state(), BufferState::Active);
        queue.complete(head, BufferState::Done);

        let done = queue.try_dequeue().unwrap();
        assert_eq!(done.state(), BufferState::Done);
        assert_eq!(queue.queued_len(), 2);
    }

    #[test]
    fn test_undersized_buffer_goes_straight_to_error() {
        let queue = BufferQueue::new(64);
        let small = QueueBuffer::new(9, 8);

        let err = queue.submit(small).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BufferTooSmall {
                index: 9,
                size: 8,
                required: 64
            }
        ));

        let returned = queue.try_dequeue().unwrap();
        assert_eq!(returned.state(), BufferState::Error);
        assert_eq!(queue.queued_len(), 0);
        assert_eq!(queue.stats().activated, 0);
    }

    #[test]
    fn test_pop_on_empty_counts_starvation() {
        let queue = BufferQueue::new(4);
        assert!(queue.pop_active().is_none());
        assert_eq!(queue.stats().starved, 1);
    }

    #[test]
    fn test_flush_errors_everything() {
        let queue = BufferQueue::new(4);
        for buffer in queue.allocate(4) {
            queue.submit(buffer).unwrap();
        }
        assert_eq!(queue.flush(BufferState::Error), 4);
        assert_eq!(queue.queued_len(), 0);

        let indices: Vec<u32> = std::iter::from_fn(|| queue.try_dequeue())
            .inspect(|b| assert_eq!(b.state(), BufferState::Error))
            .map(|b| b.index())
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_concurrent_submitters() {
        let queue = Arc::new(BufferQueue::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for buffer in queue.allocate(25) {
                        queue.submit(buffer).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.queued_len(), 100);
        assert_eq!(queue.stats().submitted, 100);
    }
}
