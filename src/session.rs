//! Per-file owner of the index, the registry and the operations.
//!
//! A [`FileSession`] is the unit a viewer holds while one remote file is on screen.
//! Opening another file, closing, or changing the encoding cancels everything still
//! running against the old state and starts over with an empty index.

use crate::config::EngineConfig;
use crate::error::{Result, RtlessError};
use crate::exec::ExecChannel;
use crate::index::{ByteOffsetIndex, SharedIndex};
use crate::operation::{
    BuildByteOffsetMapOperation, GrepOperation, OperationRegistry, SaveRangeContentOperation,
    TailFollowOperation,
};
use crate::remote::{GrepRequest, RemoteFileAccessor, TextLineStream};
use log::info;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The file a session currently shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFile {
    pub path: String,
    /// Remote encoding; `None` means the local one
    pub encoding: Option<String>,
    /// Size in bytes when the file was opened
    pub size: u64,
}

pub struct FileSession {
    config: EngineConfig,
    accessor: Arc<RemoteFileAccessor>,
    registry: Arc<OperationRegistry>,
    index: SharedIndex,
    current: RwLock<Option<OpenFile>>,
    build_map: Arc<BuildByteOffsetMapOperation>,
    grep: Arc<GrepOperation>,
    save_range: Arc<SaveRangeContentOperation>,
    tail_follow: Arc<TailFollowOperation>,
}

impl FileSession {
    pub fn new(channel: Arc<dyn ExecChannel>, config: EngineConfig) -> Self {
        let accessor = Arc::new(
            RemoteFileAccessor::new(channel).with_local_encoding(config.local_encoding.clone()),
        );
        let registry = Arc::new(OperationRegistry::new());
        let index = ByteOffsetIndex::shared();

        let build_map = Arc::new(BuildByteOffsetMapOperation::new(
            Arc::clone(&accessor),
            Arc::clone(&registry),
            Arc::clone(&index),
        ));
        let grep = Arc::new(GrepOperation::new(
            Arc::clone(&accessor),
            Arc::clone(&registry),
            Arc::clone(&index),
        ));
        let save_range = Arc::new(SaveRangeContentOperation::new(
            Arc::clone(&accessor),
            Arc::clone(&registry),
            Arc::clone(&index),
        ));
        let tail_follow = Arc::new(TailFollowOperation::new(
            Arc::clone(&accessor),
            Arc::clone(&registry),
            Arc::clone(&index),
            config.tail_chunk_size,
        ));

        Self {
            config,
            accessor,
            registry,
            index,
            current: RwLock::new(None),
            build_map,
            grep,
            save_range,
            tail_follow,
        }
    }

    /// Switch to `path`, dropping all state of the previous file
    ///
    /// # Errors
    /// * `InvalidArgument` for an empty path
    /// * `NotConnected` if the channel is down
    pub async fn open(&self, path: &str, encoding: Option<&str>) -> Result<OpenFile> {
        if path.trim().is_empty() {
            return Err(RtlessError::invalid_argument("path must not be empty"));
        }
        self.discard_state();

        let size = self.accessor.file_size(path).await?;
        let file = OpenFile {
            path: path.to_string(),
            encoding: encoding.map(str::to_string),
            size,
        };
        info!("opened {path} ({size} bytes)");
        *self.current.write() = Some(file.clone());
        Ok(file)
    }

    /// Forget the current file and cancel its operations
    pub fn close(&self) {
        self.discard_state();
        if let Some(file) = self.current.write().take() {
            info!("closed {}", file.path);
        }
    }

    /// Re-decode the current file; the index and running operations start over
    pub fn change_encoding(&self, encoding: Option<&str>) -> Result<()> {
        let mut current = self.current.write();
        let file = current
            .as_mut()
            .ok_or_else(|| RtlessError::invalid_argument("no file is open"))?;

        self.registry.cancel_all();
        self.index.write().reset();
        file.encoding = encoding.map(str::to_string);
        info!("{} now read as {:?}", file.path, file.encoding);
        Ok(())
    }

    fn discard_state(&self) {
        self.registry.cancel_all();
        self.index.write().reset();
    }

    pub fn current(&self) -> Option<OpenFile> {
        self.current.read().clone()
    }

    fn require_open(&self) -> Result<OpenFile> {
        self.current()
            .ok_or_else(|| RtlessError::invalid_argument("no file is open"))
    }

    /// Lines `start_line..=end_line` of the current file, seeking from the index
    pub async fn read_lines(
        &self,
        start_line: u64,
        end_line: u64,
        cancel: CancellationToken,
    ) -> Result<TextLineStream> {
        let file = self.require_open()?;
        let checkpoint = self.index.read().find(start_line);
        self.accessor
            .get_lines(
                &file.path,
                start_line,
                end_line,
                file.encoding.as_deref(),
                checkpoint,
                cancel,
            )
            .await
    }

    /// Current line count of the open file
    pub async fn count_lines(&self) -> Result<u64> {
        let file = self.require_open()?;
        self.accessor.count_lines(&file.path).await
    }

    /// Grep request for the current file with the configured defaults
    pub fn grep_request(&self, pattern: impl Into<String>) -> Result<GrepRequest> {
        let file = self.require_open()?;
        Ok(GrepRequest {
            max_results: self.config.grep_max_results,
            encoding: file.encoding,
            ..GrepRequest::new(file.path, pattern)
        })
    }

    /// Build (or extend) the index of the current file
    pub async fn build_index(&self, cancel: &CancellationToken) -> Result<usize> {
        let file = self.require_open()?;
        let total = self.accessor.file_size(&file.path).await?;
        self.build_map
            .run(&file.path, self.config.index_interval, total, cancel)
            .await
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn accessor(&self) -> &Arc<RemoteFileAccessor> {
        &self.accessor
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn build_map(&self) -> &Arc<BuildByteOffsetMapOperation> {
        &self.build_map
    }

    pub fn grep(&self) -> &Arc<GrepOperation> {
        &self.grep
    }

    pub fn save_range(&self) -> &Arc<SaveRangeContentOperation> {
        &self.save_range
    }

    pub fn tail_follow(&self) -> &Arc<TailFollowOperation> {
        &self.tail_follow
    }
}
