//! Per-thread dirty-card queues and the global queue set.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::card_table::CardIndex;
use crate::config::RemSetConfig;
use crate::queue::buffer::BufferNode;
use crate::stats::RemSetStats;

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The card was appended; nothing else to do.
    Enqueued,
    /// The card was appended, but the completed list has grown past the
    /// backpressure threshold: the caller must refine one completed buffer
    /// synchronously before continuing.
    MustRefine,
}

/// State behind the queue set's single coarse lock.
///
/// The completed list and the free-node stack share one monitor by
/// design: refinement throughput does not justify sharding, and a single
/// lock keeps the node lifecycle trivially exclusive.
struct QueueSetInner {
    /// Completed buffers awaiting refinement, oldest first.
    completed: VecDeque<BufferNode>,
    /// Recycled nodes, most recently returned on top.
    free: Vec<BufferNode>,
    /// Arena identities handed out so far.
    next_id: u32,
    /// Nodes currently alive anywhere (free, completed, or active).
    live_nodes: u32,
}

/// Global set of completed dirty-card buffers plus the node free list.
pub struct DirtyCardQueueSet {
    inner: Mutex<QueueSetInner>,
    /// Signalled when completed buffers cross the activation threshold or
    /// on shutdown.
    work_available: Condvar,
    /// Mirror of `inner.completed.len()`, readable without the lock on the
    /// enqueue fast path.
    completed_count: AtomicUsize,
    buffer_capacity: usize,
    max_free_buffers: usize,
    refine_activation_threshold: usize,
    mutator_refinement_threshold: usize,
    stats: Arc<RemSetStats>,
}

impl DirtyCardQueueSet {
    /// Create an empty queue set with the given tuning.
    pub fn new(config: &RemSetConfig, stats: Arc<RemSetStats>) -> Self {
        Self {
            inner: Mutex::new(QueueSetInner {
                completed: VecDeque::new(),
                free: Vec::with_capacity(config.max_free_buffers),
                next_id: 0,
                live_nodes: 0,
            }),
            work_available: Condvar::new(),
            completed_count: AtomicUsize::new(0),
            buffer_capacity: config.buffer_capacity,
            max_free_buffers: config.max_free_buffers,
            refine_activation_threshold: config.refine_activation_threshold,
            mutator_refinement_threshold: config.mutator_refinement_threshold,
            stats,
        }
    }

    /// Take a recycled node or allocate a fresh one.
    pub fn allocate_node(&self) -> BufferNode {
        let mut inner = self.inner.lock();
        if let Some(node) = inner.free.pop() {
            return node;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.live_nodes += 1;
        BufferNode::new(id, self.buffer_capacity)
    }

    /// Splice a buffer onto the completed list (O(1) under the lock).
    pub fn push_completed(&self, node: BufferNode) {
        if node.is_empty() {
            self.release_node(node);
            return;
        }
        let count = {
            let mut inner = self.inner.lock();
            inner.completed.push_back(node);
            let count = inner.completed.len();
            self.completed_count.store(count, Ordering::Release);
            count
        };
        RemSetStats::bump(&self.stats.buffers_completed);
        if count >= self.refine_activation_threshold {
            self.work_available.notify_all();
        }
    }

    /// Pop one completed buffer, or `None` if the list is empty.
    ///
    /// Callers must tolerate `None`; an empty queue is an expected state,
    /// not an error.
    pub fn try_claim_completed(&self) -> Option<BufferNode> {
        let mut inner = self.inner.lock();
        let node = inner.completed.pop_front();
        if node.is_some() {
            self.completed_count
                .store(inner.completed.len(), Ordering::Release);
        }
        node
    }

    /// Return a drained node to the free stack.
    ///
    /// Nodes beyond the retention cap are dropped rather than hoarded.
    pub fn release_node(&self, mut node: BufferNode) {
        node.reset();
        let mut inner = self.inner.lock();
        if inner.free.len() < self.max_free_buffers {
            inner.free.push(node);
        } else {
            inner.live_nodes -= 1;
        }
    }

    /// Completed-buffer count without taking the lock.
    #[inline]
    pub fn completed_count(&self) -> usize {
        self.completed_count.load(Ordering::Acquire)
    }

    /// Whether producers should refine synchronously (backpressure).
    #[inline]
    pub fn needs_mutator_refinement(&self) -> bool {
        self.completed_count() > self.mutator_refinement_threshold
    }

    /// Block the calling refinement thread until completed buffers are
    /// available or `stopping` is set. Spurious wakeups are fine; callers
    /// re-check with [`Self::try_claim_completed`].
    pub fn park_until_work(&self, stopping: &AtomicBool) {
        let mut inner = self.inner.lock();
        while inner.completed.is_empty() && !stopping.load(Ordering::Acquire) {
            self.work_available.wait(&mut inner);
        }
    }

    /// Wake every parked refinement thread (shutdown path).
    pub fn notify_all(&self) {
        self.work_available.notify_all();
    }

    // =========================================================================
    // Lifecycle Accounting (diagnostics and tests)
    // =========================================================================

    /// Nodes currently alive anywhere.
    pub fn live_nodes(&self) -> usize {
        self.inner.lock().live_nodes as usize
    }

    /// Nodes on the free stack.
    pub fn free_len(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Nodes on the completed list.
    pub fn completed_len(&self) -> usize {
        self.inner.lock().completed.len()
    }

    /// Nodes neither free nor completed: active in producers or claimed by
    /// refiners.
    pub fn active_nodes(&self) -> usize {
        let inner = self.inner.lock();
        inner.live_nodes as usize - inner.free.len() - inner.completed.len()
    }
}

/// A mutator (or refinement) thread's dirty-card queue.
///
/// Holds at most one active buffer node; appending is a plain indexed
/// store with no lock or atomic. Only the buffer-exchange path touches
/// the queue set's lock.
#[derive(Default)]
pub struct DirtyCardQueue {
    active: Option<BufferNode>,
}

impl DirtyCardQueue {
    /// Create a queue with no active buffer.
    pub fn new() -> Self {
        Self { active: None }
    }

    /// Append `card`; on buffer-full, hand the buffer to the queue set and
    /// report whether the caller owes a synchronous refinement pass.
    pub fn enqueue(&mut self, card: CardIndex, set: &DirtyCardQueueSet) -> EnqueueOutcome {
        let node = self.active.get_or_insert_with(|| set.allocate_node());
        let full = node.push(card);
        RemSetStats::bump(&set.stats.cards_enqueued);
        if full {
            let node = self.active.take().expect("active buffer just filled");
            set.push_completed(node);
            if set.needs_mutator_refinement() {
                return EnqueueOutcome::MustRefine;
            }
        }
        EnqueueOutcome::Enqueued
    }

    /// Hand any partially filled buffer to the queue set.
    ///
    /// Called for every mutator thread at pause start so the merge phase
    /// sees all log entries, and on thread exit.
    pub fn flush(&mut self, set: &DirtyCardQueueSet) {
        if let Some(node) = self.active.take() {
            set.push_completed(node);
        }
    }

    /// Entries in the active buffer (tests).
    pub fn pending(&self) -> usize {
        self.active.as_ref().map_or(0, BufferNode::len)
    }
}

/// A mutex-wrapped queue for contexts without a dedicated owning thread.
///
/// Refinement uses it to re-enqueue unparsable cards; it is explicitly
/// flushed at pause start rather than handed over when full. Backpressure
/// is deliberately not propagated here — the enqueuing thread is already
/// a refinement participant.
pub struct SharedDirtyCardQueue {
    inner: Mutex<DirtyCardQueue>,
}

impl SharedDirtyCardQueue {
    /// Create an empty shared queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DirtyCardQueue::new()),
        }
    }

    /// Append `card` under the shared lock.
    pub fn enqueue(&self, card: CardIndex, set: &DirtyCardQueueSet) {
        let _ = self.inner.lock().enqueue(card, set);
    }

    /// Flush any buffered entries to the completed list.
    pub fn flush(&self, set: &DirtyCardQueueSet) {
        self.inner.lock().flush(set);
    }
}

impl Default for SharedDirtyCardQueue {
    fn default() -> Self {
        Self::new()
    }
}
