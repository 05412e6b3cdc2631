use conduit_core::DataPoint;

use crate::error::FeedResult;

/// Outcome of asking a stream for its next element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance<T> {
    /// An element is available
    Ready(T),
    /// Nothing yet; the stream is still live and should be polled again later
    Pending,
    /// The stream has ended and will never produce again
    Done,
}

impl<T> Advance<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Advance::Ready(_))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Advance::Done)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Advance::Ready(item) => Some(item),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Advance<U> {
        match self {
            Advance::Ready(item) => Advance::Ready(f(item)),
            Advance::Pending => Advance::Pending,
            Advance::Done => Advance::Done,
        }
    }
}

/// Port for a pull-based source of market data for one instrument
///
/// Elements must be produced in nondecreasing `end_time` order. Pipeline stages
/// implement this trait themselves so they can be stacked.
pub trait DataStream: Send {
    /// Produce the next element, report that none is ready yet, or signal the end
    fn advance(&mut self) -> FeedResult<Advance<DataPoint>>;

    /// Release any resources held by the stream; called once when the consumer is done
    fn close(&mut self) {}
}

impl<S: DataStream + ?Sized> DataStream for Box<S> {
    fn advance(&mut self) -> FeedResult<Advance<DataPoint>> {
        (**self).advance()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
