//! Per-user queue store

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::domain::{Task, UserKey};

/// Drain loop state for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainState {
    /// No drain loop scheduled or running
    #[default]
    Idle,

    /// A drain step is scheduled or in flight
    Draining,
}

/// Pending tasks for one owner plus its drain flag
#[derive(Debug)]
pub struct UserQueue {
    owner: UserKey,
    pending: VecDeque<Task>,
    state: DrainState,
}

impl UserQueue {
    fn new(owner: UserKey) -> Self {
        Self {
            owner,
            pending: VecDeque::new(),
            state: DrainState::Idle,
        }
    }

    pub fn owner(&self) -> &UserKey {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn state(&self) -> DrainState {
        self.state
    }
}

/// Mapping from user to its FIFO of pending tasks
///
/// Queues are created on first submission and kept for the life of the
/// worker, even once empty.
#[derive(Debug, Default)]
pub struct QueueStore {
    queues: HashMap<UserKey, UserQueue>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `task` to its owner's queue, returning the new length
    pub fn enqueue(&mut self, task: Task) -> usize {
        let owner = task.owner().clone();
        let queue = self
            .queues
            .entry(owner.clone())
            .or_insert_with(|| UserQueue::new(owner.clone()));
        queue.pending.push_back(task);
        let len = queue.pending.len();
        debug!(%owner, len, "QueueStore::enqueue: appended");
        len
    }

    pub fn peek_front(&self, key: &UserKey) -> Option<&Task> {
        self.queues.get(key).and_then(|q| q.pending.front())
    }

    /// Remove the head task; only called once the head has run
    pub fn pop_front(&mut self, key: &UserKey) -> Option<Task> {
        let task = self.queues.get_mut(key).and_then(|q| q.pending.pop_front());
        debug!(%key, popped = task.is_some(), "QueueStore::pop_front: called");
        task
    }

    pub fn len(&self, key: &UserKey) -> usize {
        self.queues.get(key).map_or(0, UserQueue::len)
    }

    pub fn is_empty(&self, key: &UserKey) -> bool {
        self.len(key) == 0
    }

    pub fn state(&self, key: &UserKey) -> DrainState {
        self.queues.get(key).map_or(DrainState::Idle, UserQueue::state)
    }

    /// Move `key` from Idle to Draining
    ///
    /// Returns false when a drain loop already owns the key (or the key has
    /// no queue), so callers start at most one loop per key.
    pub fn begin_drain(&mut self, key: &UserKey) -> bool {
        match self.queues.get_mut(key) {
            Some(queue) if queue.state == DrainState::Idle => {
                queue.state = DrainState::Draining;
                debug!(%key, "QueueStore::begin_drain: idle -> draining");
                true
            }
            _ => false,
        }
    }

    /// Return `key` to Idle
    pub fn finish_drain(&mut self, key: &UserKey) {
        if let Some(queue) = self.queues.get_mut(key) {
            debug!(%key, "QueueStore::finish_drain: draining -> idle");
            queue.state = DrainState::Idle;
        }
    }

    pub fn get(&self, key: &UserKey) -> Option<&UserQueue> {
        self.queues.get(key)
    }

    /// Number of keys with a queue (empty or not)
    pub fn key_count(&self) -> usize {
        self.queues.len()
    }

    /// Number of keys whose drain loop is live
    pub fn draining_count(&self) -> usize {
        self.queues.values().filter(|q| q.state == DrainState::Draining).count()
    }

    /// Tasks waiting across all keys
    pub fn total_pending(&self) -> usize {
        self.queues.values().map(UserQueue::len).sum()
    }
}
