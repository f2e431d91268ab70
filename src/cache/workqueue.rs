// src/cache/workqueue.rs

//! Keyed work queue with delayed and rate-limited adds
//!
//! A key is queued at most once at a time. A key that is added while it is
//! being processed is queued again when processing finishes with
//! [`WorkQueue::done`]. Delays run on the tokio clock.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::rate_limit::{RateLimiter, default_rate_limiter};

#[derive(Default)]
struct State {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    /// Delayed keys ordered by ready time; stale entries are skipped
    waiting: BinaryHeap<Reverse<(Instant, String)>>,
    /// Earliest ready time per delayed key
    ready_at: HashMap<String, Instant>,
    shutting_down: bool,
}

impl State {
    fn add(&mut self, item: &str) -> bool {
        if self.shutting_down || self.dirty.contains(item) {
            return false;
        }
        self.dirty.insert(item.to_string());
        if self.processing.contains(item) {
            return false;
        }
        self.queue.push_back(item.to_string());
        true
    }

    /// Move every delayed key whose time has come onto the queue
    fn promote_ready(&mut self, now: Instant) {
        while let Some(Reverse((at, _))) = self.waiting.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((at, item))) = self.waiting.pop() else {
                break;
            };
            if self.ready_at.get(&item) == Some(&at) {
                self.ready_at.remove(&item);
                self.add(&item);
            }
        }
    }

    fn next_ready(&self) -> Option<Instant> {
        self.waiting.peek().map(|Reverse((at, _))| *at)
    }
}

/// Work queue for catalog source keys
pub struct WorkQueue {
    state: Mutex<State>,
    notify: Notify,
    limiter: Box<dyn RateLimiter>,
}

impl WorkQueue {
    /// Queue using the default controller rate limiter
    pub fn new() -> Self {
        Self::with_rate_limiter(Box::new(default_rate_limiter()))
    }

    pub fn with_rate_limiter(limiter: Box<dyn RateLimiter>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            limiter,
        }
    }

    /// Queue a key for immediate processing
    pub fn add(&self, item: &str) {
        if self.state.lock().add(item) {
            self.notify.notify_one();
        }
    }

    /// Queue a key once `delay` has passed
    pub fn add_after(&self, item: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }

        let at = Instant::now() + delay;
        {
            let mut state = self.state.lock();
            if state.shutting_down {
                return;
            }
            if state.ready_at.get(item).is_some_and(|existing| *existing <= at) {
                return;
            }
            state.ready_at.insert(item.to_string(), at);
            state.waiting.push(Reverse((at, item.to_string())));
        }
        // wake the consumer so it re-arms its timer
        self.notify.notify_one();
    }

    /// Queue a key after its rate-limited backoff
    pub fn add_rate_limited(&self, item: &str) {
        let delay = self.limiter.when(item);
        self.add_after(item, delay);
    }

    /// Reset a key's backoff history
    pub fn forget(&self, item: &str) {
        self.limiter.forget(item);
    }

    /// Rate-limited retries of a key since it was last forgotten
    pub fn num_requeues(&self, item: &str) -> u32 {
        self.limiter.num_requeues(item)
    }

    /// Wait for the next key; `None` once the queue is shut down and drained
    ///
    /// The returned key must be passed to [`done`](Self::done) after processing.
    pub async fn get(&self) -> Option<String> {
        loop {
            let deadline = {
                let mut state = self.state.lock();
                state.promote_ready(Instant::now());

                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
                state.next_ready()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    /// Mark a key as processed, requeueing it if it was added meanwhile
    pub fn done(&self, item: &str) {
        let requeued = {
            let mut state = self.state.lock();
            state.processing.remove(item);
            if state.dirty.contains(item) {
                state.queue.push_back(item.to_string());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Stop accepting keys and drop delayed ones
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            state.shutting_down = true;
            state.waiting.clear();
            state.ready_at.clear();
        }
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Keys ready for processing
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
