use chrono::Duration;
use std::sync::Arc;

/// Read accessor for a resolution that may change during a stream's life
///
/// Fill-forward reads it at every step instead of capturing a value once.
pub trait ResolutionSource: Send + Sync {
    fn current(&self) -> Duration;
}

impl ResolutionSource for Duration {
    fn current(&self) -> Duration {
        *self
    }
}

impl<R: ResolutionSource + ?Sized> ResolutionSource for Arc<R> {
    fn current(&self) -> Duration {
        (**self).current()
    }
}
