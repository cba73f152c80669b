//! In-memory priority queue feeding the dispatch loop.
//!
//! Entries are served lowest priority value first; entries with equal
//! priority are served in submission order. Every popped entry must be
//! acknowledged with [`JobQueue::task_done`]; [`JobQueue::join`] waits until
//! all pushed entries have been acknowledged. [`JobQueue::close`] queues the
//! shutdown sentinel; pushes after it are refused, so the sentinel is always
//! the last entry served.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// A queued job, or the shutdown sentinel when `job` is `None`.
#[derive(Debug)]
pub struct QueueEntry<T> {
    pub priority: i32,
    pub sequence: u64,
    pub job: Option<T>,
}

impl<T> QueueEntry<T> {
    pub fn is_sentinel(&self) -> bool {
        self.job.is_none()
    }
}

impl<T> PartialEq for QueueEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for QueueEntry<T> {}

impl<T> PartialOrd for QueueEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueueEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: the smallest (priority, sequence) must compare greatest.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct QueueState<T> {
    heap: BinaryHeap<QueueEntry<T>>,
    next_sequence: u64,
    /// Pushed entries not yet acknowledged.
    unfinished: usize,
    /// Set once the sentinel has been queued.
    closed: bool,
}

impl<T> QueueState<T> {
    fn enqueue(&mut self, priority: i32, job: Option<T>) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.unfinished += 1;
        self.heap.push(QueueEntry {
            priority,
            sequence,
            job,
        });
        sequence
    }
}

/// Unbounded priority queue with acknowledgement tracking.
pub struct JobQueue<T> {
    state: Mutex<QueueState<T>>,
    /// Signalled when an entry is pushed.
    available: Notify,
    /// Signalled when the last outstanding entry is acknowledged.
    drained: Notify,
}

impl<T> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JobQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_sequence: 0,
                unfinished: 0,
                closed: false,
            }),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    /// Push a job. Once the queue is closed the job is handed back.
    pub fn push(&self, priority: i32, job: T) -> Result<u64, T> {
        let sequence = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(job);
            }
            state.enqueue(priority, Some(job))
        };
        self.available.notify_one();
        Ok(sequence)
    }

    /// Queue the shutdown sentinel at `priority` and refuse further pushes.
    ///
    /// Returns `false` if the queue was already closed.
    pub fn close(&self, priority: i32) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            state.enqueue(priority, None);
        }
        self.available.notify_one();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Wait for and remove the most urgent entry.
    pub async fn pop(&self) -> QueueEntry<T> {
        loop {
            if let Some(entry) = self.try_pop() {
                return entry;
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the check above and this await is not lost.
            self.available.notified().await;
        }
    }

    pub fn try_pop(&self) -> Option<QueueEntry<T>> {
        self.state.lock().heap.pop()
    }

    /// Acknowledge one popped entry.
    pub fn task_done(&self) {
        let mut state = self.state.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
        if state.unfinished == 0 {
            self.drained.notify_waiters();
        }
    }

    /// Wait until every pushed entry has been acknowledged.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state.lock().unfinished == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of entries waiting to be popped.
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries pushed but not yet acknowledged.
    pub fn unfinished(&self) -> usize {
        self.state.lock().unfinished
    }
}
