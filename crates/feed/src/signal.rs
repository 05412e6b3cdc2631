use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::scheduler::WorkHandle;

/// "New data may be available" notification for one subscription
///
/// Raised by live data sources and by the bar aggregator's close alarm. It wakes a
/// consumer blocked on a synchronous subscription and, in worker mode, the parked
/// producer bound to it.
pub struct NewDataSignal {
    raised: Mutex<bool>,
    condvar: Condvar,
    producer: Mutex<Option<WorkHandle>>,
}

impl NewDataSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            raised: Mutex::new(false),
            condvar: Condvar::new(),
            producer: Mutex::new(None),
        })
    }

    /// Route future notifications to a scheduled producer as well
    pub fn bind(&self, producer: WorkHandle) {
        *self.producer.lock() = Some(producer);
    }

    pub fn notify(&self) {
        *self.raised.lock() = true;
        self.condvar.notify_all();
        if let Some(producer) = self.producer.lock().as_ref() {
            producer.wake();
        }
    }

    /// Wait up to `timeout` for a notification; returns whether one arrived
    ///
    /// A notification raised before the call is consumed immediately.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut raised = self.raised.lock();
        while !*raised {
            if self.condvar.wait_until(&mut raised, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *raised, false)
    }
}
