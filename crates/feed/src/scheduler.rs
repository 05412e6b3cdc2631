//! Weighted work scheduler
//!
//! A fixed pool of worker threads shared by every worker-mode subscription. Each
//! queued work item is a "produce a batch" function plus a weight function
//! reporting the item's current backlog. Workers always pick the ready item with
//! the smallest weight, so near-idle subscriptions are not starved by a noisy one.
//!
//! ## Lifecycle of a work item
//!
//! ```text
//!          ┌───────────── Continue (weight recomputed) ─────────────┐
//!          ▼                                                        │
//!   ready queue ──pop──▶ weight >= max? ──no──▶ produce(batch) ─────┤
//!          ▲                  │ yes                                 │
//!          │                  ▼                                     ├── Idle ──▶ sleeping
//!          └──── due / wake ── sleeping ◀───────────────────────────┘
//!                                                    Finished ──▶ dropped
//! ```

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::SchedulerConfig;
use conduit_ports::{FeedError, FeedResult};

/// Identifier of a queued work item
pub type WorkId = u64;

/// What a produce call achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Batch cap reached; run again when ranked first
    Continue,
    /// Nothing to produce right now; park until woken or the idle back-off elapses
    Idle,
    /// Work is complete; drop it
    Finished,
}

type ProduceFn = Box<dyn FnMut(usize) -> WorkOutcome + Send>;
type WeightFn = Box<dyn Fn() -> usize + Send>;

struct WorkItem {
    produce: ProduceFn,
    weight: WeightFn,
}

struct Sleeper {
    wake_at: Instant,
    weight: usize,
}

struct SchedulerState {
    /// Ranked by smallest weight, then by arrival
    ready: PriorityQueue<WorkId, Reverse<(usize, u64)>>,
    /// Items not currently being run by a worker
    items: HashMap<WorkId, WorkItem>,
    sleeping: HashMap<WorkId, Sleeper>,
    /// Items a worker has taken out of `items`
    running: HashSet<WorkId>,
    /// Wake requests for items that were running when `wake` was called
    wake_requested: HashSet<WorkId>,
    next_id: WorkId,
    next_sequence: u64,
    shutting_down: bool,
}

impl SchedulerState {
    fn push_ready(&mut self, id: WorkId, weight: usize) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.ready.push(id, Reverse((weight, sequence)));
    }

    /// Move every sleeper whose wake time has passed into the ready queue
    fn promote_due(&mut self, now: Instant) {
        let due: Vec<(WorkId, usize)> = self
            .sleeping
            .iter()
            .filter(|(_, sleeper)| sleeper.wake_at <= now)
            .map(|(id, sleeper)| (*id, sleeper.weight))
            .collect();
        for (id, weight) in due {
            self.sleeping.remove(&id);
            self.push_ready(id, weight);
        }
    }

    fn next_wake(&self) -> Option<Instant> {
        self.sleeping.values().map(|sleeper| sleeper.wake_at).min()
    }
}

struct Shared {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    work_available: Condvar,
}

impl Shared {
    /// Return an item to the scheduler after it ran (or was throttled)
    fn requeue(&self, id: WorkId, item: WorkItem, weight: usize, sleep_for: Option<Duration>) {
        let mut state = self.state.lock();
        state.running.remove(&id);
        if state.shutting_down {
            state.wake_requested.remove(&id);
            drop(state);
            drop(item);
            return;
        }
        state.items.insert(id, item);
        let woken = state.wake_requested.remove(&id);
        match sleep_for {
            Some(delay) if !woken => {
                state.sleeping.insert(
                    id,
                    Sleeper {
                        wake_at: Instant::now() + delay,
                        weight,
                    },
                );
                // A sleeper may now be the earliest deadline
                self.work_available.notify_one();
            }
            _ => {
                state.push_ready(id, weight);
                self.work_available.notify_one();
            }
        }
    }
}

/// Handle to a queued work item
#[derive(Clone)]
pub struct WorkHandle {
    id: WorkId,
    shared: Arc<Shared>,
}

impl WorkHandle {
    pub fn id(&self) -> WorkId {
        self.id
    }

    /// Make a parked item runnable now
    ///
    /// If the item is currently running, its next park is skipped instead.
    pub fn wake(&self) {
        let mut state = self.shared.state.lock();
        if let Some(sleeper) = state.sleeping.remove(&self.id) {
            state.push_ready(self.id, sleeper.weight);
            drop(state);
            self.shared.work_available.notify_one();
        } else if state.running.contains(&self.id) {
            state.wake_requested.insert(self.id);
        }
    }
}

/// Pool of worker threads running weighted work items
pub struct WeightedWorkScheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WeightedWorkScheduler {
    /// Spawn the worker threads
    pub fn new(config: SchedulerConfig) -> FeedResult<Self> {
        if config.worker_threads == 0 || config.work_batch_size == 0 {
            return Err(FeedError::InvalidConfiguration(
                "scheduler needs at least one worker and a non-zero batch size".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            config: config.clone(),
            state: Mutex::new(SchedulerState {
                ready: PriorityQueue::new(),
                items: HashMap::new(),
                sleeping: HashMap::new(),
                running: HashSet::new(),
                wake_requested: HashSet::new(),
                next_id: 0,
                next_sequence: 0,
                shutting_down: false,
            }),
            work_available: Condvar::new(),
        });

        let scheduler = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(config.worker_threads)),
        };

        for index in 0..config.worker_threads {
            let shared = Arc::clone(&scheduler.shared);
            let handle = thread::Builder::new()
                .name(format!("weighted-worker-{}", index))
                .spawn(move || Self::run(index, shared))
                .map_err(|e| FeedError::Spawn(e.to_string()))?;
            scheduler.workers.lock().push(handle);
        }

        info!(
            "Weighted work scheduler started: workers={} batch={} max_weight={}",
            config.worker_threads, config.work_batch_size, config.max_work_weight
        );
        Ok(scheduler)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Queue a work item
    ///
    /// `produce` receives the batch cap and reports what it achieved; `weight`
    /// reports the item's backlog and is re-read only after a batch completes.
    pub fn queue_work<P, W>(&self, produce: P, weight: W) -> WorkHandle
    where
        P: FnMut(usize) -> WorkOutcome + Send + 'static,
        W: Fn() -> usize + Send + 'static,
    {
        let initial_weight = weight();
        let item = WorkItem {
            produce: Box::new(produce),
            weight: Box::new(weight),
        };

        let mut state = self.shared.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        if !state.shutting_down {
            state.items.insert(id, item);
            state.push_ready(id, initial_weight);
        } else {
            warn!("Work {} queued after scheduler shutdown; dropped", id);
        }
        drop(state);
        self.shared.work_available.notify_one();

        WorkHandle {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of items known to the scheduler that are not currently running
    pub fn pending_work(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    fn next_item(shared: &Shared) -> Option<(WorkId, WorkItem)> {
        let mut state = shared.state.lock();
        loop {
            if state.shutting_down {
                return None;
            }
            state.promote_due(Instant::now());
            if let Some((id, _)) = state.ready.pop() {
                if let Some(item) = state.items.remove(&id) {
                    state.running.insert(id);
                    return Some((id, item));
                }
                continue;
            }
            match state.next_wake() {
                Some(wake_at) => {
                    shared.work_available.wait_until(&mut state, wake_at);
                }
                None => shared.work_available.wait(&mut state),
            }
        }
    }

    fn run(index: usize, shared: Arc<Shared>) {
        debug!("Worker {} started", index);
        let batch_size = shared.config.work_batch_size;

        while let Some((id, mut item)) = Self::next_item(&shared) {
            let weight = (item.weight)();
            if weight >= shared.config.max_work_weight {
                debug!("Work {} throttled at weight {}", id, weight);
                shared.requeue(id, item, weight, Some(shared.config.throttle_wait()));
                continue;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (item.produce)(batch_size)))
                .unwrap_or_else(|_| {
                    error!("Work {} panicked; dropping it", id);
                    WorkOutcome::Finished
                });

            match outcome {
                WorkOutcome::Continue => {
                    let weight = (item.weight)();
                    shared.requeue(id, item, weight, None);
                }
                WorkOutcome::Idle => {
                    let weight = (item.weight)();
                    shared.requeue(id, item, weight, Some(shared.config.idle_backoff()));
                }
                WorkOutcome::Finished => {
                    let mut state = shared.state.lock();
                    state.running.remove(&id);
                    state.wake_requested.remove(&id);
                    drop(state);
                    drop(item);
                    debug!("Work {} finished", id);
                }
            }
        }

        debug!("Worker {} stopped", index);
    }

    /// Stop every worker and drop all queued work; blocks until the workers exit
    pub fn shutdown(&self) {
        let items = {
            let mut state = self.shared.state.lock();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
            state.ready.clear();
            state.sleeping.clear();
            std::mem::take(&mut state.items)
        };
        self.shared.work_available.notify_all();

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.join().is_err() {
                error!("Worker thread panicked during shutdown");
            }
        }

        // Dropped outside the lock: work items may close their streams on drop
        drop(items);
        info!("Weighted work scheduler stopped");
    }
}

impl Drop for WeightedWorkScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn config(workers: usize) -> SchedulerConfig {
        SchedulerConfig {
            worker_threads: workers,
            work_batch_size: 5,
            max_work_weight: 100,
            throttle_wait_ms: 1,
            idle_backoff_ms: 5,
        }
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_runs_until_finished() {
        let _ = env_logger::try_init();
        let scheduler = WeightedWorkScheduler::new(config(2)).unwrap();
        let produced = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&produced);
        scheduler.queue_work(
            move |batch| {
                let total = counter.fetch_add(batch, Ordering::SeqCst) + batch;
                if total >= 50 {
                    WorkOutcome::Finished
                } else {
                    WorkOutcome::Continue
                }
            },
            || 0,
        );

        assert!(wait_until(|| produced.load(Ordering::SeqCst) >= 50));
        assert!(wait_until(|| scheduler.pending_work() == 0));
        assert_eq!(produced.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_smallest_weight_runs_first() {
        let _ = env_logger::try_init();
        let scheduler = WeightedWorkScheduler::new(config(1)).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Occupy the single worker so both items are ranked together
        let gate = Arc::new(AtomicBool::new(false));
        let gate_flag = Arc::clone(&gate);
        scheduler.queue_work(
            move |_| {
                while !gate_flag.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
                WorkOutcome::Finished
            },
            || 0,
        );
        thread::sleep(Duration::from_millis(20));

        for (name, weight) in [("heavy", 50usize), ("light", 1usize)] {
            let order = Arc::clone(&order);
            scheduler.queue_work(
                move |_| {
                    order.lock().push(name);
                    WorkOutcome::Finished
                },
                move || weight,
            );
        }
        gate.store(true, Ordering::SeqCst);

        assert!(wait_until(|| order.lock().len() == 2));
        assert_eq!(*order.lock(), vec!["light", "heavy"]);
    }

    #[test]
    fn test_throttled_work_waits_for_backlog_to_drain() {
        let scheduler = WeightedWorkScheduler::new(config(1)).unwrap();
        let backlog = Arc::new(AtomicUsize::new(150));
        let runs = Arc::new(AtomicUsize::new(0));

        let run_counter = Arc::clone(&runs);
        let weight_source = Arc::clone(&backlog);
        scheduler.queue_work(
            move |_| {
                run_counter.fetch_add(1, Ordering::SeqCst);
                WorkOutcome::Finished
            },
            move || weight_source.load(Ordering::SeqCst),
        );

        thread::sleep(Duration::from_millis(30));
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        backlog.store(10, Ordering::SeqCst);
        assert!(wait_until(|| runs.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_idle_work_is_retried_and_wake_is_immediate() {
        let mut slow = config(1);
        slow.idle_backoff_ms = 60_000;
        let scheduler = WeightedWorkScheduler::new(slow).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let handle = scheduler.queue_work(
            move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    WorkOutcome::Idle
                } else {
                    WorkOutcome::Finished
                }
            },
            || 0,
        );

        assert!(wait_until(|| calls.load(Ordering::SeqCst) == 1));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handle.wake();
        assert!(wait_until(|| calls.load(Ordering::SeqCst) == 2));
    }

    #[test]
    fn test_wake_after_finish_is_ignored() {
        let scheduler = WeightedWorkScheduler::new(config(2)).unwrap();
        let finished = Arc::new(AtomicUsize::new(0));

        let handles: Vec<WorkHandle> = (0..100)
            .map(|_| {
                let counter = Arc::clone(&finished);
                scheduler.queue_work(
                    move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        WorkOutcome::Finished
                    },
                    || 0,
                )
            })
            .collect();

        assert!(wait_until(|| {
            finished.load(Ordering::SeqCst) == 100
                && scheduler.shared.state.lock().running.is_empty()
        }));

        for handle in &handles {
            handle.wake();
        }
        let state = scheduler.shared.state.lock();
        assert!(state.wake_requested.is_empty());
        assert!(state.sleeping.is_empty());
        assert!(state.ready.is_empty());
    }

    #[test]
    fn test_panicking_work_is_dropped() {
        let scheduler = WeightedWorkScheduler::new(config(1)).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        scheduler.queue_work(|_| panic!("boom"), || 0);
        let flag = Arc::clone(&done);
        scheduler.queue_work(
            move |_| {
                flag.store(true, Ordering::SeqCst);
                WorkOutcome::Finished
            },
            || 0,
        );

        assert!(wait_until(|| done.load(Ordering::SeqCst)));
    }

    #[test]
    fn test_shutdown_drops_pending_work() {
        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let mut slow = config(1);
        slow.idle_backoff_ms = 60_000;
        let scheduler = WeightedWorkScheduler::new(slow).unwrap();
        let dropped = Arc::new(AtomicBool::new(false));

        let guard = DropFlag(Arc::clone(&dropped));
        scheduler.queue_work(
            move |_| {
                let _ = &guard;
                WorkOutcome::Idle
            },
            || 0,
        );
        thread::sleep(Duration::from_millis(20));

        scheduler.shutdown();
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_rejects_zero_workers() {
        assert!(WeightedWorkScheduler::new(config(0)).is_err());
    }
}
