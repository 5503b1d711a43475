//! Time-windowed batching of item streams.
//!
//! [`chunk_for_add_range`] turns a stream of single items (lines, checkpoints) into a
//! stream of batches so a consumer can apply them with one bulk call instead of one call
//! per item. A batch is emitted once `max_interval` has elapsed since the previous one,
//! checked whenever an item arrives and on an idle tick, and the remainder is emitted when
//! the source ends. An empty source produces no batches.
//!
//! Time is only read through a [`Clock`], so tests can drive the window by hand.

use futures::stream::{BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;

/// Batches in flight between the aggregator task and its consumer
const BATCH_CHANNEL_CAPACITY: usize = 16;

/// Smallest idle tick period; a zero window would otherwise spin
const MIN_TICK: Duration = Duration::from_millis(1);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Tokio's clock (honours paused time in tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Group `source` into batches at most one `max_interval` apart
///
/// Must be called within a tokio runtime; the aggregation runs on a spawned task that
/// stops when the source ends or the returned stream is dropped.
pub fn chunk_for_add_range<S, T>(
    source: S,
    max_interval: Duration,
    clock: Arc<dyn Clock>,
) -> BoxStream<'static, Vec<T>>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
    let mut last_flush = clock.now();

    tokio::spawn(async move {
        let mut source = Box::pin(source);
        let mut buffer = Vec::new();

        let period = max_interval.max(MIN_TICK);
        let mut idle = tokio::time::interval_at(Instant::now() + period, period);
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let window_closed = tokio::select! {
                item = source.next() => match item {
                    Some(item) => {
                        buffer.push(item);
                        true
                    }
                    None => break,
                },
                _ = idle.tick() => !buffer.is_empty(),
                _ = tx.closed() => return,
            };

            if window_closed && clock.now().duration_since(last_flush) >= max_interval {
                if tx.send(std::mem::take(&mut buffer)).await.is_err() {
                    return;
                }
                last_flush = clock.now();
            }
        }

        if !buffer.is_empty() {
            let _ = tx.send(buffer).await;
        }
    });

    ReceiverStream::new(rx).boxed()
}
