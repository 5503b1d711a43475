//! Follow a growing remote file and keep the index in step with it.

use crate::error::{Result, RtlessError};
use crate::index::SharedIndex;
use crate::model::TextLine;
use crate::operation::observable::{Observable, RunningGuard};
use crate::operation::registry::OperationRegistry;
use crate::operation::{forward, next_item};
use crate::remote::RemoteFileAccessor;
use log::{debug, trace};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Streams appended lines and extends the index every `chunk_size` lines.
pub struct TailFollowOperation {
    accessor: Arc<RemoteFileAccessor>,
    registry: Arc<OperationRegistry>,
    index: SharedIndex,
    chunk_size: u64,
    running: Observable<bool>,
    last_line_number: Observable<u64>,
}

impl TailFollowOperation {
    /// `chunk_size` is clamped to at least 1
    pub fn new(
        accessor: Arc<RemoteFileAccessor>,
        registry: Arc<OperationRegistry>,
        index: SharedIndex,
        chunk_size: u64,
    ) -> Self {
        Self {
            accessor,
            registry,
            index,
            chunk_size: chunk_size.max(1),
            running: Observable::new(false),
            last_line_number: Observable::new(0),
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn subscribe_running(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    /// Line number of the latest line forwarded
    pub fn last_line_number(&self) -> u64 {
        self.last_line_number.get()
    }

    pub fn subscribe_last_line_number(&self) -> watch::Receiver<u64> {
        self.last_line_number.subscribe()
    }

    /// Follow `path` from the index's last checkpoint, forwarding lines after
    /// `last_known_line` to `out`
    ///
    /// If the remote stream ends on its own, a checkpoint for the last line seen is
    /// appended. Cancellation or a closed consumer skips that final checkpoint.
    pub async fn run(
        &self,
        path: &str,
        encoding: Option<&str>,
        last_known_line: u64,
        cancel: &CancellationToken,
        out: &mpsc::Sender<TextLine>,
    ) -> Result<()> {
        if path.trim().is_empty() {
            return Ok(());
        }
        if !self.accessor.is_connected() {
            return Err(RtlessError::NotConnected);
        }

        let handle = self.registry.register(cancel);
        let token = handle.token();
        let _running = RunningGuard::start(&self.running);

        let start = self.index.read().find_last();
        let mut last_seen = start.line_number.max(last_known_line);
        self.last_line_number.set(last_seen);
        debug!(
            "following {path} from line {} (known up to {last_known_line})",
            start.line_number
        );

        let mut lines = self
            .accessor
            .tail_follow(path, encoding, start, last_known_line, token.clone())
            .await?;

        let mut interrupted = false;
        while let Some(line) = next_item(&mut lines, token).await {
            let line_number = line.line_number;
            if !forward(out, line, token).await {
                interrupted = true;
                break;
            }
            last_seen = line_number;
            self.last_line_number.set(line_number);

            if line_number % self.chunk_size == 0 {
                self.extend_index(path, line_number, token).await?;
            }
        }

        if interrupted || token.is_cancelled() {
            debug!("tail of {path} stopped at line {last_seen}");
            return Ok(());
        }
        self.extend_index(path, last_seen, token).await?;
        debug!("tail of {path} ended at line {last_seen}");
        Ok(())
    }

    /// Append a checkpoint for `line_number` unless the index already covers it
    async fn extend_index(
        &self,
        path: &str,
        line_number: u64,
        token: &CancellationToken,
    ) -> Result<()> {
        let from = self.index.read().find_last();
        if line_number <= from.line_number {
            return Ok(());
        }

        let checkpoint = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            found = self.accessor.create_offset_until_line(path, from, line_number) => found?,
        };
        // a cancelled token means the index may already belong to another file
        if token.is_cancelled() {
            return Ok(());
        }
        if let Some(checkpoint) = checkpoint {
            trace!("tail checkpoint {checkpoint:?}");
            self.index.write().add(checkpoint);
        }
        Ok(())
    }
}
