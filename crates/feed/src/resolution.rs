use chrono::Duration;
use conduit_ports::ResolutionSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Fill-forward resolution the owner can change while a subscription runs
///
/// The stage holding it reads the current value at every step.
#[derive(Debug)]
pub struct DynamicResolution {
    nanos: AtomicI64,
}

fn to_nanos(resolution: Duration) -> i64 {
    resolution.num_nanoseconds().unwrap_or(i64::MAX)
}

impl DynamicResolution {
    pub fn new(initial: Duration) -> Arc<Self> {
        Arc::new(Self {
            nanos: AtomicI64::new(to_nanos(initial)),
        })
    }

    pub fn set(&self, resolution: Duration) {
        self.nanos.store(to_nanos(resolution), Ordering::Release);
    }
}

impl ResolutionSource for DynamicResolution {
    fn current(&self) -> Duration {
        Duration::nanoseconds(self.nanos.load(Ordering::Acquire))
    }
}
