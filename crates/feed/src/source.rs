//! Adapters that turn plain data sources into [`DataStream`]s

use conduit_core::DataPoint;
use conduit_ports::{Advance, DataStream, FeedResult};
use crossbeam_channel::{Receiver, TryRecvError};

/// Finite stream over an iterator (file replay, in-memory history)
pub struct IterStream<I> {
    inner: I,
}

impl<I> IterStream<I>
where
    I: Iterator<Item = DataPoint> + Send,
{
    pub fn new(inner: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            inner: inner.into_iter(),
        }
    }
}

impl<I> DataStream for IterStream<I>
where
    I: Iterator<Item = DataPoint> + Send,
{
    fn advance(&mut self) -> FeedResult<Advance<DataPoint>> {
        Ok(match self.inner.next() {
            Some(point) => Advance::Ready(point),
            None => Advance::Done,
        })
    }
}

/// Finite stream over an iterator whose reads can fail
pub struct FallibleStream<I> {
    inner: I,
}

impl<I> FallibleStream<I>
where
    I: Iterator<Item = FeedResult<DataPoint>> + Send,
{
    pub fn new(inner: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            inner: inner.into_iter(),
        }
    }
}

impl<I> DataStream for FallibleStream<I>
where
    I: Iterator<Item = FeedResult<DataPoint>> + Send,
{
    fn advance(&mut self) -> FeedResult<Advance<DataPoint>> {
        match self.inner.next() {
            Some(Ok(point)) => Ok(Advance::Ready(point)),
            Some(Err(error)) => Err(error),
            None => Ok(Advance::Done),
        }
    }
}

/// Live stream fed through a channel; pending while the channel is empty,
/// done once every sender has been dropped and the channel is drained
pub struct ChannelStream {
    receiver: Receiver<DataPoint>,
}

impl ChannelStream {
    pub fn new(receiver: Receiver<DataPoint>) -> Self {
        Self { receiver }
    }
}

impl DataStream for ChannelStream {
    fn advance(&mut self) -> FeedResult<Advance<DataPoint>> {
        Ok(match self.receiver.try_recv() {
            Ok(point) => Advance::Ready(point),
            Err(TryRecvError::Empty) => Advance::Pending,
            Err(TryRecvError::Disconnected) => Advance::Done,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use conduit_ports::FeedError;
    use rust_decimal_macros::dec;

    fn tick(minute: u32) -> DataPoint {
        let time = NaiveDate::from_ymd_opt(2024, 3, 4)
            .and_then(|d| d.and_hms_opt(10, minute, 0))
            .unwrap();
        DataPoint::trade_tick("SPY", time, dec!(100), dec!(1))
    }

    #[test]
    fn test_iter_stream_ends() {
        let mut stream = IterStream::new(vec![tick(0), tick(1)]);
        assert!(stream.advance().unwrap().is_ready());
        assert!(stream.advance().unwrap().is_ready());
        assert!(stream.advance().unwrap().is_done());
    }

    #[test]
    fn test_fallible_stream_surfaces_errors() {
        let mut stream = FallibleStream::new(vec![
            Ok(tick(0)),
            Err(FeedError::SourceFaulted("disk".to_string())),
        ]);
        assert!(stream.advance().unwrap().is_ready());
        assert_eq!(
            stream.advance(),
            Err(FeedError::SourceFaulted("disk".to_string()))
        );
    }

    #[test]
    fn test_channel_stream_pending_then_done() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut stream = ChannelStream::new(receiver);

        assert_eq!(stream.advance().unwrap(), Advance::Pending);
        sender.send(tick(0)).unwrap();
        assert!(stream.advance().unwrap().is_ready());

        drop(sender);
        assert!(stream.advance().unwrap().is_done());
    }
}
