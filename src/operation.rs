//! Cancellable streaming operations with progress reporting.
//!
//! All four operations share one shape:
//!
//! 1. Invalid input (empty path, blank query, bad range) is a silent no-op: nothing is
//!    registered, nothing is streamed, no error is raised.
//! 2. A scope is registered under the caller's token, `is_running` turns on, counters
//!    reset, and the progress denominator is captured.
//! 3. Items are pulled from the [`RemoteFileAccessor`](crate::remote::RemoteFileAccessor)
//!    and forwarded; the counter is taken from each item.
//! 4. Cancellation (caller token, `cancel_all`, or a dropped consumer) ends the run
//!    cleanly with `Ok`, leaving counters at their last value.
//! 5. `is_running` turns off however the run ends.

pub mod build_map;
pub mod grep;
pub mod observable;
pub mod registry;
pub mod save_range;
pub mod tail_follow;

pub use build_map::BuildByteOffsetMapOperation;
pub use grep::GrepOperation;
pub use observable::{ratio, Observable};
pub use registry::{OperationHandle, OperationId, OperationRegistry};
pub use save_range::SaveRangeContentOperation;
pub use tail_follow::TailFollowOperation;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Pull the next item unless the scope is cancelled first
pub(crate) async fn next_item<S>(stream: &mut S, token: &CancellationToken) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        item = stream.next() => item,
    }
}

/// Forward an item to the consumer
///
/// # Returns
/// * `false` if the scope was cancelled or the consumer went away
pub(crate) async fn forward<T>(out: &mpsc::Sender<T>, item: T, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = out.send(item) => sent.is_ok(),
    }
}
