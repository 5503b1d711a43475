//! Incremental construction of the checkpoint index.

use crate::error::{Result, RtlessError};
use crate::index::SharedIndex;
use crate::model::ByteOffset;
use crate::operation::next_item;
use crate::operation::observable::{ratio, Observable, RunningGuard};
use crate::operation::registry::OperationRegistry;
use crate::remote::RemoteFileAccessor;
use log::debug;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Streams checkpoints for a remote file into the shared index.
///
/// A run resumes from the index's last checkpoint, so calling it again after the file
/// has grown only scans the new tail.
pub struct BuildByteOffsetMapOperation {
    accessor: Arc<RemoteFileAccessor>,
    registry: Arc<OperationRegistry>,
    index: SharedIndex,
    running: Observable<bool>,
    processed_bytes: Observable<u64>,
    total_bytes: Observable<u64>,
}

impl BuildByteOffsetMapOperation {
    pub fn new(
        accessor: Arc<RemoteFileAccessor>,
        registry: Arc<OperationRegistry>,
        index: SharedIndex,
    ) -> Self {
        Self {
            accessor,
            registry,
            index,
            running: Observable::new(false),
            processed_bytes: Observable::new(0),
            total_bytes: Observable::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn subscribe_running(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    /// Byte offset of the latest checkpoint seen in the current (or last) run
    pub fn processed_bytes(&self) -> u64 {
        self.processed_bytes.get()
    }

    pub fn subscribe_processed_bytes(&self) -> watch::Receiver<u64> {
        self.processed_bytes.subscribe()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.get()
    }

    /// `processed / total` in `[0, 1]`; 0 while the total is unknown
    pub fn progress(&self) -> f64 {
        ratio(self.processed_bytes(), self.total_bytes())
    }

    /// Index `path` with one checkpoint every `interval` lines
    ///
    /// # Returns
    /// * Number of checkpoints appended to the index
    ///
    /// # Errors
    /// * `NotConnected` before anything is registered
    pub async fn run(
        &self,
        path: &str,
        interval: u64,
        total_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if path.trim().is_empty() || interval == 0 {
            return Ok(0);
        }
        if !self.accessor.is_connected() {
            return Err(RtlessError::NotConnected);
        }

        let handle = self.registry.register(cancel);
        let _running = RunningGuard::start(&self.running);

        let start = self.index.read().find_last();
        self.processed_bytes.set(start.bytes);
        self.total_bytes.set(total_bytes);
        debug!(
            "building offset map for {path} from line {} (interval {interval})",
            start.line_number
        );

        let mut checkpoints = self
            .accessor
            .create_byte_offset_map(path, interval, start, handle.token().clone())
            .await?;

        let mut added = 0;
        while let Some(checkpoint) = next_item(&mut checkpoints, handle.token()).await {
            if self.record(checkpoint, handle.token()) {
                added += 1;
            } else if handle.is_cancelled() {
                break;
            }
        }

        debug!(
            "offset map for {path}: {added} checkpoints added{}",
            if handle.is_cancelled() { " (cancelled)" } else { "" }
        );
        Ok(added)
    }

    /// Append one checkpoint and advance progress, unless `token` was cancelled.
    ///
    /// The index may have been reset for another file once the token is cancelled.
    fn record(&self, checkpoint: ByteOffset, token: &CancellationToken) -> bool {
        if token.is_cancelled() {
            return false;
        }
        let added = self.index.write().add(checkpoint);
        if checkpoint.bytes > self.processed_bytes.get() {
            self.processed_bytes.set(checkpoint.bytes);
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecChannel, MockExecChannel};
    use crate::index::ByteOffsetIndex;

    fn setup(
        mock: &Arc<MockExecChannel>,
    ) -> (BuildByteOffsetMapOperation, SharedIndex, Arc<OperationRegistry>) {
        let accessor = Arc::new(RemoteFileAccessor::new(
            Arc::clone(mock) as Arc<dyn ExecChannel>
        ));
        let registry = Arc::new(OperationRegistry::new());
        let index = ByteOffsetIndex::shared();
        let op = BuildByteOffsetMapOperation::new(accessor, Arc::clone(&registry), Arc::clone(&index));
        (op, index, registry)
    }

    #[tokio::test]
    async fn test_build_fills_index_and_progress() {
        let mock = Arc::new(MockExecChannel::new());
        mock.push_lines(["100\t1000", "200\t2000", "250\t2600"]);
        let (op, index, registry) = setup(&mock);

        let mut seen = op.subscribe_processed_bytes();
        let added = op.run("/a.log", 100, 2600, &CancellationToken::new()).await.unwrap();

        assert_eq!(added, 3);
        assert_eq!(index.read().count(), 3);
        assert_eq!(index.read().find_last(), ByteOffset::new(250, 2600));
        assert_eq!(op.processed_bytes(), 2600);
        assert_eq!(op.progress(), 1.0);
        assert!(!op.is_running());
        assert!(registry.is_empty());
        assert!(seen.has_changed().unwrap());
        assert_eq!(*seen.borrow_and_update(), 2600);
    }

    #[tokio::test]
    async fn test_progress_zero_without_total() {
        let mock = Arc::new(MockExecChannel::new());
        mock.push_lines(["100\t1000"]);
        let (op, _, _) = setup(&mock);

        op.run("/a.log", 100, 0, &CancellationToken::new()).await.unwrap();
        assert_eq!(op.processed_bytes(), 1000);
        assert_eq!(op.progress(), 0.0);
    }

    #[tokio::test]
    async fn test_resumes_from_last_checkpoint() {
        let mock = Arc::new(MockExecChannel::new());
        mock.push_lines(["300\t3000"]);
        let (op, index, _) = setup(&mock);
        index.write().add(ByteOffset::new(200, 2000));

        op.run("/a.log", 100, 3000, &CancellationToken::new()).await.unwrap();

        assert!(mock.commands()[0].contains("tail -c +2001"));
        assert!(mock.commands()[0].contains("-v base_line=200"));
        assert_eq!(index.read().count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_input_is_noop() {
        let mock = Arc::new(MockExecChannel::new());
        let (op, index, registry) = setup(&mock);

        assert_eq!(op.run("", 100, 10, &CancellationToken::new()).await.unwrap(), 0);
        assert_eq!(op.run("/a.log", 0, 10, &CancellationToken::new()).await.unwrap(), 0);
        assert!(mock.commands().is_empty());
        assert_eq!(index.read().count(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_freezes_counters() {
        let mock = Arc::new(MockExecChannel::new());
        mock.push_open_lines(["100\t1000", "200\t2000"]);
        let (op, index, registry) = setup(&mock);
        let op = Arc::new(op);

        let cancel = CancellationToken::new();
        let mut bytes = op.subscribe_processed_bytes();
        let task = {
            let op = Arc::clone(&op);
            let cancel = cancel.clone();
            tokio::spawn(async move { op.run("/a.log", 100, 10_000, &cancel).await })
        };

        while *bytes.borrow_and_update() < 2000 {
            bytes.changed().await.unwrap();
        }
        assert!(op.is_running());
        cancel.cancel();

        assert_eq!(task.await.unwrap().unwrap(), 2);
        assert!(!op.is_running());
        assert_eq!(op.processed_bytes(), 2000);
        assert_eq!(op.progress(), 0.2);
        assert_eq!(index.read().count(), 2);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all_stops_build() {
        let mock = Arc::new(MockExecChannel::new());
        mock.push_open_lines(["100\t1000"]);
        let (op, _, registry) = setup(&mock);
        let op = Arc::new(op);

        let mut running = op.subscribe_running();
        let task = {
            let op = Arc::clone(&op);
            tokio::spawn(async move { op.run("/a.log", 100, 0, &CancellationToken::new()).await })
        };

        while !*running.borrow_and_update() {
            running.changed().await.unwrap();
        }
        registry.cancel_all();

        assert!(task.await.unwrap().is_ok());
        assert!(!op.is_running());
    }

    #[test]
    fn test_cancelled_token_records_nothing() {
        let mock = Arc::new(MockExecChannel::new());
        let (op, index, registry) = setup(&mock);
        index.write().add(ByteOffset::new(10, 100));

        let reopened = CancellationToken::new();
        let handle = registry.register(&reopened);
        registry.cancel_all();

        assert!(!op.record(ByteOffset::new(20, 200), handle.token()));
        assert_eq!(index.read().count(), 1);
        assert_eq!(op.processed_bytes(), 0);

        let live = CancellationToken::new();
        assert!(op.record(ByteOffset::new(20, 200), &live));
        assert_eq!(index.read().find_last(), ByteOffset::new(20, 200));
        assert_eq!(op.processed_bytes(), 200);
    }

    #[tokio::test]
    async fn test_not_connected_before_registering() {
        let mock = Arc::new(MockExecChannel::new());
        mock.disconnect();
        let (op, _, registry) = setup(&mock);

        let result = op.run("/a.log", 100, 0, &CancellationToken::new()).await;
        assert!(matches!(result, Err(RtlessError::NotConnected)));
        assert!(registry.is_empty());
        assert!(!op.is_running());
    }
}
