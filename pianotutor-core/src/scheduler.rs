//! Deferred flushes.
//!
//! Key presses change LEDs in bursts (chords, fast runs). Instead of flushing
//! after each one, the tutor asks a `FlushScheduler` to run a flush a few
//! milliseconds later. Redundant flushes are cheap because the link only sends
//! one when pixels actually changed, so nothing is ever cancelled.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

pub type FlushCallback = Box<dyn FnOnce() + Send + 'static>;

/// Runs a callback once, some time later, on a thread that does not hold the tutor lock.
pub trait FlushScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, callback: FlushCallback);
}

struct Job {
    deadline: Instant,
    seq: u64,
    callback: FlushCallback,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// A background thread running callbacks at their deadlines.
///
/// Dropping it stops the thread; callbacks still pending are discarded.
pub struct TimerThread {
    tx: Option<Sender<(Instant, FlushCallback)>>,
    handle: Option<JoinHandle<()>>,
}

impl TimerThread {
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("pianotutor-flush".into())
            .spawn(move || timer_loop(rx))?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }
}

impl FlushScheduler for TimerThread {
    fn schedule(&self, delay: Duration, callback: FlushCallback) {
        let Some(tx) = &self.tx else { return };
        if tx.send((Instant::now() + delay, callback)).is_err() {
            log::warn!(target: "scheduler", "flush timer thread is gone, dropping flush");
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn timer_loop(rx: Receiver<(Instant, FlushCallback)>) {
    let mut pending: BinaryHeap<Reverse<Job>> = BinaryHeap::new();
    let mut seq = 0u64;
    loop {
        let now = Instant::now();
        while pending
            .peek()
            .is_some_and(|Reverse(job)| job.deadline <= now)
        {
            if let Some(Reverse(job)) = pending.pop() {
                (job.callback)();
            }
        }

        let received = match pending.peek() {
            Some(Reverse(next)) => rx.recv_timeout(next.deadline.saturating_duration_since(now)),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok((deadline, callback)) => {
                seq += 1;
                pending.push(Reverse(Job {
                    deadline,
                    seq,
                    callback,
                }));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::trace!(target: "scheduler", "flush timer thread exited");
}

/// Queues callbacks until `run_pending` is called.
///
/// For tests, and for hosts that drive flushes from their own event loop.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<Vec<(Duration, FlushCallback)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Requested delays of the waiting callbacks, in scheduling order.
    pub fn delays(&self) -> Vec<Duration> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(delay, _)| *delay)
            .collect()
    }

    /// Run everything queued so far, ignoring delays. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let jobs = std::mem::take(&mut *self.queue.lock().unwrap_or_else(PoisonError::into_inner));
        let count = jobs.len();
        for (_, callback) in jobs {
            callback();
        }
        count
    }
}

impl FlushScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: FlushCallback) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((delay, callback));
    }
}
