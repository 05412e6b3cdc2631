use conduit_ports::Advance;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

struct QueueState<T> {
    items: VecDeque<T>,
    finished: bool,
}

/// FIFO hand-off between a background producer and a consumer
///
/// There is no capacity limit; production is throttled by the scheduler instead.
/// Once stopped, the queue accepts nothing further, and the check happens under the
/// same lock as the push so a racing `stop()` can never be followed by an enqueue.
/// Items already queued can still be dequeued after `stop()`.
pub struct EnqueueableQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> Default for EnqueueableQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EnqueueableQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                finished: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append an item; returns false (dropping the item) if the queue has finished
    pub fn enqueue(&self, item: T) -> bool {
        let mut state = self.state.lock();
        if state.finished {
            return false;
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Mark the queue finished and wake every waiting consumer
    pub fn stop(&self) {
        self.state.lock().finished = true;
        self.available.notify_all();
    }

    pub fn has_finished(&self) -> bool {
        self.state.lock().finished
    }

    /// Number of buffered items
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the next item without blocking
    pub fn try_dequeue(&self) -> Advance<T> {
        let mut state = self.state.lock();
        Self::take(&mut state)
    }

    /// Take the next item, waiting up to `timeout` for one to arrive
    ///
    /// Returns `Pending` on timeout and `Done` once the queue is finished and drained.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Advance<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            match Self::take(&mut state) {
                Advance::Pending => {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        return Self::take(&mut state);
                    }
                }
                outcome => return outcome,
            }
        }
    }

    fn take(state: &mut QueueState<T>) -> Advance<T> {
        match state.items.pop_front() {
            Some(item) => Advance::Ready(item),
            None if state.finished => Advance::Done,
            None => Advance::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = EnqueueableQueue::new();
        assert!(queue.enqueue(1));
        assert!(queue.enqueue(2));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_dequeue(), Advance::Ready(1));
        assert_eq!(queue.try_dequeue(), Advance::Ready(2));
        assert_eq!(queue.try_dequeue(), Advance::Pending);
    }

    #[test]
    fn test_stop_rejects_enqueue_but_drains() {
        let queue = EnqueueableQueue::new();
        assert!(queue.enqueue("a"));
        queue.stop();

        assert!(!queue.enqueue("b"));
        assert!(queue.has_finished());
        assert_eq!(queue.try_dequeue(), Advance::Ready("a"));
        assert_eq!(queue.try_dequeue(), Advance::Done);
    }

    #[test]
    fn test_dequeue_times_out() {
        let queue: EnqueueableQueue<u32> = EnqueueableQueue::new();
        let started = Instant::now();
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(20)), Advance::Pending);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_dequeue_wakes_on_enqueue_and_stop() {
        let queue = Arc::new(EnqueueableQueue::new());

        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.enqueue(7u32);
            thread::sleep(Duration::from_millis(10));
            producer.stop();
        });

        assert_eq!(queue.dequeue_timeout(Duration::from_secs(5)), Advance::Ready(7));
        assert_eq!(queue.dequeue_timeout(Duration::from_secs(5)), Advance::Done);
        handle.join().unwrap();
    }
}
