//! Export a line range of a remote file to a local sink.

use crate::error::{Result, RtlessError};
use crate::index::SharedIndex;
use crate::operation::next_item;
use crate::operation::observable::{ratio, Observable, RunningGuard};
use crate::operation::registry::OperationRegistry;
use crate::remote::RemoteFileAccessor;
use log::{debug, info};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub struct SaveRangeContentOperation {
    accessor: Arc<RemoteFileAccessor>,
    registry: Arc<OperationRegistry>,
    index: SharedIndex,
    running: Observable<bool>,
    saved_lines: Observable<u64>,
    total_lines: Observable<u64>,
}

impl SaveRangeContentOperation {
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
            saved_lines: Observable::new(0),
            total_lines: Observable::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn subscribe_running(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    pub fn saved_lines(&self) -> u64 {
        self.saved_lines.get()
    }

    pub fn subscribe_saved_lines(&self) -> watch::Receiver<u64> {
        self.saved_lines.subscribe()
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines.get()
    }

    pub fn progress(&self) -> f64 {
        ratio(self.saved_lines(), self.total_lines())
    }

    /// Write lines `start_line..=end_line` to `sink`, one per line, newline-terminated
    ///
    /// An invalid range is a no-op: the sink is never touched and nothing is registered.
    ///
    /// # Errors
    /// * `Io` if the sink fails; lines already written stay written
    pub async fn run<W>(
        &self,
        path: &str,
        start_line: u64,
        end_line: u64,
        encoding: Option<&str>,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if path.trim().is_empty() || start_line < 1 || end_line < start_line {
            return Ok(());
        }
        if !self.accessor.is_connected() {
            return Err(RtlessError::NotConnected);
        }

        let handle = self.registry.register(cancel);
        let _running = RunningGuard::start(&self.running);
        self.saved_lines.set(0);
        self.total_lines.set(end_line - start_line + 1);

        let checkpoint = self.index.read().find(start_line);
        let mut lines = self
            .accessor
            .get_lines(
                path,
                start_line,
                end_line,
                encoding,
                checkpoint,
                handle.token().clone(),
            )
            .await?;

        let mut saved = 0;
        while let Some(line) = next_item(&mut lines, handle.token()).await {
            sink.write_all(line.content.as_bytes()).await?;
            sink.write_all(b"\n").await?;
            saved += 1;
            self.saved_lines.set(saved);
        }
        sink.flush().await?;

        if handle.is_cancelled() {
            debug!("save of {path} cancelled after {saved} lines");
        } else {
            info!("saved {saved} lines of {path} ({start_line}..={end_line})");
        }
        Ok(())
    }
}
