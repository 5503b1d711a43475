//! Remote grep with line-based progress.

use crate::error::{Result, RtlessError};
use crate::index::SharedIndex;
use crate::model::TextLine;
use crate::operation::observable::{ratio, Observable, RunningGuard};
use crate::operation::registry::OperationRegistry;
use crate::operation::{forward, next_item};
use crate::remote::{GrepRequest, RemoteFileAccessor};
use log::debug;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Streams grep hits to a consumer; progress is the line number of the latest hit
/// over the file's line count.
pub struct GrepOperation {
    accessor: Arc<RemoteFileAccessor>,
    registry: Arc<OperationRegistry>,
    index: SharedIndex,
    running: Observable<bool>,
    received_line_count: Observable<u64>,
    total_line_count: Observable<u64>,
}

impl GrepOperation {
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
            received_line_count: Observable::new(0),
            total_line_count: Observable::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn subscribe_running(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    /// Absolute line number of the latest hit
    pub fn received_line_count(&self) -> u64 {
        self.received_line_count.get()
    }

    pub fn subscribe_received_line_count(&self) -> watch::Receiver<u64> {
        self.received_line_count.subscribe()
    }

    pub fn total_line_count(&self) -> u64 {
        self.total_line_count.get()
    }

    pub fn progress(&self) -> f64 {
        ratio(self.received_line_count(), self.total_line_count())
    }

    /// Run `request` and forward every hit to `out`
    ///
    /// Ends when the remote grep finishes, when `cancel` fires, or when `out` is closed.
    pub async fn run(
        &self,
        request: &GrepRequest,
        total_line_count: u64,
        cancel: &CancellationToken,
        out: &mpsc::Sender<TextLine>,
    ) -> Result<()> {
        if request.path.trim().is_empty()
            || request.pattern.trim().is_empty()
            || request.start_line < 1
        {
            return Ok(());
        }
        if !self.accessor.is_connected() {
            return Err(RtlessError::NotConnected);
        }

        let handle = self.registry.register(cancel);
        let _running = RunningGuard::start(&self.running);
        self.received_line_count.set(0);
        self.total_line_count.set(total_line_count);

        let checkpoint = self.index.read().find(request.start_line);
        debug!(
            "grep {:?} in {} from line {} (seek line {})",
            request.pattern, request.path, request.start_line, checkpoint.line_number
        );

        let mut hits = self
            .accessor
            .grep(request, checkpoint, handle.token().clone())
            .await?;

        while let Some(hit) = next_item(&mut hits, handle.token()).await {
            let line_number = hit.line_number;
            if !forward(out, hit, handle.token()).await {
                break;
            }
            self.received_line_count.set(line_number);
        }
        Ok(())
    }
}
