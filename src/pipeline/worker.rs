//! Background tasks for generator and consumer entities.
//!
//! A task runs on its own thread and paces itself with a [`Ticker`]: either a
//! fixed rate (the sensor's frame rate) or one tick per manual trigger. Stop
//! is cooperative. The running flag is checked at every tick boundary and the
//! signal channel is closed to wake a task that is waiting for its next tick.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How a task decides when to run its next iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickMode {
    /// Fixed interval between ticks.
    Periodic(Duration),
    /// One tick per call to [`TaskHandle::trigger`].
    Manual,
}

impl TickMode {
    /// Rate in Hz, with 0 selecting manual triggering.
    pub fn from_rate(hz: u32) -> Self {
        if hz == 0 {
            TickMode::Manual
        } else {
            TickMode::Periodic(Duration::from_nanos(1_000_000_000 / hz as u64))
        }
    }
}

/// Task-side half: waits for ticks.
pub struct Ticker {
    mode: TickMode,
    running: Arc<AtomicBool>,
    signal_rx: Receiver<()>,
    next: Instant,
}

impl Ticker {
    /// Block until the next tick. Returns `false` once the task must exit.
    pub fn wait(&mut self) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }

        match self.mode {
            TickMode::Manual => match self.signal_rx.recv() {
                Ok(()) => self.running.load(Ordering::Acquire),
                Err(_) => false,
            },
            TickMode::Periodic(interval) => {
                loop {
                    match self.signal_rx.recv_deadline(self.next) {
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => return false,
                        // Triggers mean nothing to a periodic task
                        Ok(()) => {
                            if !self.running.load(Ordering::Acquire) {
                                return false;
                            }
                        }
                    }
                }

                // Late ticks are skipped, not caught up
                let now = Instant::now();
                self.next = (self.next + interval).max(now);
                self.running.load(Ordering::Acquire)
            }
        }
    }
}

/// Owner-side half: triggers and stops the task.
pub struct TaskHandle<T> {
    name: String,
    running: Arc<AtomicBool>,
    signal_tx: Sender<()>,
    join: JoinHandle<T>,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Spawn `body` on a named thread. The body owns the [`Ticker`] and
    /// returns whatever state the owner wants back after stop.
    pub fn spawn<F>(name: &str, mode: TickMode, body: F) -> PipelineResult<Self>
    where
        F: FnOnce(Ticker) -> T + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (signal_tx, signal_rx) = unbounded();
        let first_tick = match mode {
            TickMode::Periodic(interval) => Instant::now() + interval,
            TickMode::Manual => Instant::now(),
        };
        let ticker = Ticker {
            mode,
            running: running.clone(),
            signal_rx,
            next: first_tick,
        };

        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(ticker))
            .map_err(|e| {
                PipelineError::ResourceExhausted(format!("failed to spawn {}: {}", name, e))
            })?;

        tracing::debug!("Task '{}' started ({:?})", name, mode);
        Ok(Self {
            name: name.to_string(),
            running,
            signal_tx,
            join,
        })
    }

    /// Request one tick from a manually triggered task.
    pub fn trigger(&self) -> bool {
        self.signal_tx.send(()).is_ok()
    }

    /// Stop the task and wait for it to exit. Returns `None` if it panicked.
    pub fn stop(self) -> Option<T> {
        let TaskHandle {
            name,
            running,
            signal_tx,
            join,
        } = self;

        running.store(false, Ordering::Release);
        drop(signal_tx);

        match join.join() {
            Ok(value) => {
                tracing::debug!("Task '{}' stopped", name);
                Some(value)
            }
            Err(_) => {
                tracing::error!("Task '{}' panicked", name);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_rate_conversion() {
        assert_eq!(TickMode::from_rate(0), TickMode::Manual);
        assert_eq!(
            TickMode::from_rate(50),
            TickMode::Periodic(Duration::from_millis(20))
        );
    }

    #[test]
    fn test_manual_ticks_follow_triggers() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let (done_tx, done_rx) = unbounded();

        let task = TaskHandle::spawn("manual-test", TickMode::Manual, move |mut ticker| {
            while ticker.wait() {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.send(());
            }
            7u32
        })
        .unwrap();

        for _ in 0..3 {
            assert!(task.trigger());
        }
        for _ in 0..3 {
            done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }

        assert_eq!(task.stop(), Some(7));
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_periodic_stop_wakes_task() {
        // Without the wake-up, stop would wait out the full one-second tick
        let task = TaskHandle::spawn("slow-test", TickMode::from_rate(1), |mut ticker| {
            let mut ticks = 0;
            while ticker.wait() {
                ticks += 1;
            }
            ticks
        })
        .unwrap();

        let started = Instant::now();
        assert_eq!(task.stop(), Some(0));
        assert!(started.elapsed() < Duration::from_millis(900));
    }

    #[test]
    fn test_panicking_task_reports_none() {
        let task = TaskHandle::spawn("panic-test", TickMode::Manual, |_ticker: Ticker| {
            panic!("boom");
        })
        .unwrap();
        assert!(task.stop().is_none());
    }
}
