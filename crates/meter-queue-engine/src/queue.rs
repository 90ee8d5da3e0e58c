//! Bounded, thread-safe task queues.
//!
//! Both lanes share one implementation, [`BoundedQueue`], and differ only in
//! the [`QueueDiscipline`] that decides retrieval order.

use crate::error::{QueueError, Rejected};
use meter_queue_core::{PriorityClass, Task};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

/// The two queues a task can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Normal,
    Priority,
}

impl Lane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Normal => "normal",
            Lane::Priority => "priority",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval order of a bounded queue
pub trait QueueDiscipline: Default + Send {
    const LANE: Lane;

    fn push(&mut self, task: Task);
    fn pop(&mut self) -> Option<Task>;
    fn len(&self) -> usize;
}

/// Insertion order equals retrieval order
#[derive(Default)]
pub struct Fifo {
    tasks: VecDeque<Task>,
}

impl QueueDiscipline for Fifo {
    const LANE: Lane = Lane::Normal;

    fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Ascending (priority class, insertion sequence)
#[derive(Default)]
pub struct Ranked {
    heap: BinaryHeap<Reverse<RankedEntry>>,
    next_seq: u64,
}

struct RankedEntry {
    class: PriorityClass,
    seq: u64,
    task: Task,
}

impl RankedEntry {
    fn key(&self) -> (PriorityClass, u64) {
        (self.class, self.seq)
    }
}

impl PartialEq for RankedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RankedEntry {}

impl PartialOrd for RankedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl QueueDiscipline for Ranked {
    const LANE: Lane = Lane::Priority;

    fn push(&mut self, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(RankedEntry {
            class: task.priority_class(),
            seq,
            task,
        }));
    }

    fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|Reverse(entry)| entry.task)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

/// A bounded queue with non-blocking and blocking-with-timeout access.
pub struct BoundedQueue<D> {
    inner: Mutex<D>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

/// Plain bounded FIFO
pub type NormalQueue = BoundedQueue<Fifo>;
/// Bounded queue ordered by (priority class, insertion sequence)
pub type PriorityQueue = BoundedQueue<Ranked>;

impl<D: QueueDiscipline> BoundedQueue<D> {
    /// Create an empty queue holding at most `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        BoundedQueue {
            inner: Mutex::new(D::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push a task without blocking.
    pub fn put(&self, task: Task) -> Result<(), Rejected> {
        if task.is_disposed() {
            return Err(Rejected::new(QueueError::Disposed(D::LANE), task));
        }
        let mut guard = self.inner.lock();
        if guard.len() >= self.capacity {
            return Err(Rejected::new(self.full(), task));
        }
        guard.push(task);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Push a task, waiting up to `timeout` for free space.
    pub fn put_timeout(&self, task: Task, timeout: Duration) -> Result<(), Rejected> {
        if task.is_disposed() {
            return Err(Rejected::new(QueueError::Disposed(D::LANE), task));
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock();
        while guard.len() >= self.capacity {
            if self.not_full.wait_until(&mut guard, deadline).timed_out()
                && guard.len() >= self.capacity
            {
                return Err(Rejected::new(self.full(), task));
            }
        }
        guard.push(task);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pop the next task without blocking.
    pub fn get(&self) -> Result<Task, QueueError> {
        let mut guard = self.inner.lock();
        match guard.pop() {
            Some(task) => {
                self.not_full.notify_one();
                Ok(task)
            }
            None => Err(QueueError::Empty(D::LANE)),
        }
    }

    /// Pop the next task, waiting up to `timeout` for one to arrive.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Task, QueueError> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock();
        while guard.len() == 0 {
            // Wait releases the lock and re-acquires it before returning.
            if self.not_empty.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        match guard.pop() {
            Some(task) => {
                self.not_full.notify_one();
                Ok(task)
            }
            None => Err(QueueError::Empty(D::LANE)),
        }
    }

    /// Current number of queued tasks.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn full(&self) -> QueueError {
        QueueError::Full {
            lane: D::LANE,
            capacity: self.capacity,
        }
    }
}
