//! Domain requests over an exec channel.
//!
//! [`RemoteFileAccessor`] keeps no state between calls: each method composes one
//! pipeline, runs it through the [`ExecChannel`], and parses stdout back into records.

use crate::error::{Result, RtlessError};
use crate::exec::ExecChannel;
use crate::model::{ByteOffset, FileSystemObject, TextLine};
use crate::remote::command::{self, Conversion, GrepFlags};
use crate::remote::encoding::{parse_iconv_list, same_encoding};
use crate::remote::parse;
use futures::stream::{self, BoxStream, StreamExt};
use log::debug;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Working encoding of the local side
pub const DEFAULT_LOCAL_ENCODING: &str = "UTF-8";

pub type TextLineStream = BoxStream<'static, TextLine>;
pub type CheckpointStream = BoxStream<'static, ByteOffset>;

/// Parameters for a remote grep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrepRequest {
    pub path: String,
    pub pattern: String,
    /// 0 means unlimited
    pub max_results: u64,
    /// First line to search (1-based)
    pub start_line: u64,
    pub ignore_case: bool,
    pub use_regex: bool,
    /// Remote file encoding (`iconv` name); `None` means same as local
    pub encoding: Option<String>,
}

impl GrepRequest {
    pub fn new(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            pattern: pattern.into(),
            max_results: 0,
            start_line: 1,
            ignore_case: false,
            use_regex: false,
            encoding: None,
        }
    }

    fn flags(&self) -> GrepFlags {
        GrepFlags {
            max_results: self.max_results,
            ignore_case: self.ignore_case,
            use_regex: self.use_regex,
        }
    }
}

pub struct RemoteFileAccessor {
    channel: Arc<dyn ExecChannel>,
    local_encoding: String,
}

impl RemoteFileAccessor {
    pub fn new(channel: Arc<dyn ExecChannel>) -> Self {
        Self {
            channel,
            local_encoding: DEFAULT_LOCAL_ENCODING.to_string(),
        }
    }

    pub fn with_local_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.local_encoding = encoding.into();
        self
    }

    pub fn local_encoding(&self) -> &str {
        &self.local_encoding
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Conversion from the file encoding into the local one, if they differ
    fn to_local(&self, encoding: Option<&str>) -> Option<Conversion> {
        encoding
            .filter(|remote| !same_encoding(remote, &self.local_encoding))
            .map(|remote| Conversion::new(remote, self.local_encoding.as_str()))
    }

    fn to_remote(&self, encoding: Option<&str>) -> Option<Conversion> {
        encoding
            .filter(|remote| !same_encoding(remote, &self.local_encoding))
            .map(|remote| Conversion::new(self.local_encoding.as_str(), remote))
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.channel.is_connected() {
            Ok(())
        } else {
            Err(RtlessError::NotConnected)
        }
    }

    async fn stream_lines(
        &self,
        cmd: &str,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, String>> {
        let rx = self.channel.run_streaming(cmd, cancel).await?;
        Ok(ReceiverStream::new(rx).boxed())
    }

    /// List a remote directory (without the `.` entry)
    pub async fn list_directory(&self, path: &str) -> Result<Vec<FileSystemObject>> {
        require_path(path)?;
        self.ensure_connected()?;

        let output = self.channel.run(&command::list_directory(path)).await?;
        let entries: Vec<_> = output
            .lines()
            .filter_map(|line| parse::parse_listing_entry(line, path))
            .collect();
        debug!("listed {} entries in {path}", entries.len());
        Ok(entries)
    }

    /// Supported encodings the remote `iconv` knows, sorted
    pub async fn list_iconv_encodings(&self) -> Result<Vec<String>> {
        self.ensure_connected()?;
        let output = self.channel.run(&command::list_encodings()).await?;
        Ok(parse_iconv_list(&output))
    }

    /// Size of a remote file in bytes (0 if it cannot be read)
    pub async fn file_size(&self, path: &str) -> Result<u64> {
        require_path(path)?;
        self.ensure_connected()?;
        let output = self.channel.run(&command::file_size(path)).await?;
        Ok(parse::parse_count(&output))
    }

    /// Number of newline-terminated lines in a remote file (0 if it cannot be read)
    pub async fn count_lines(&self, path: &str) -> Result<u64> {
        require_path(path)?;
        self.ensure_connected()?;
        let output = self.channel.run(&command::count_lines(path)).await?;
        Ok(parse::parse_count(&output))
    }

    /// Stream lines `start_line..=end_line`
    ///
    /// # Arguments
    /// * `checkpoint` - seek point; must precede `start_line` (use `ByteOffsetIndex::find`)
    ///
    /// # Errors
    /// * `InvalidArgument` if the range or checkpoint is unusable
    pub async fn get_lines(
        &self,
        path: &str,
        start_line: u64,
        end_line: u64,
        encoding: Option<&str>,
        checkpoint: ByteOffset,
        cancel: CancellationToken,
    ) -> Result<TextLineStream> {
        require_path(path)?;
        if start_line < 1 {
            return Err(RtlessError::invalid_argument("start line must be >= 1"));
        }
        if end_line < start_line {
            return Err(RtlessError::invalid_argument(format!(
                "end line {end_line} precedes start line {start_line}"
            )));
        }
        if checkpoint.line_number >= start_line {
            return Err(RtlessError::invalid_argument(format!(
                "checkpoint line {} does not precede start line {start_line}",
                checkpoint.line_number
            )));
        }
        self.ensure_connected()?;

        let conversion = self.to_local(encoding);
        let cmd = command::read_range(path, start_line, end_line, checkpoint, conversion.as_ref());
        let count = (end_line - start_line + 1) as usize;

        let lines = self
            .stream_lines(&cmd, cancel)
            .await?
            .take(count)
            .enumerate()
            .map(move |(i, content)| TextLine::new(start_line + i as u64, content));
        Ok(lines.boxed())
    }

    /// Stream grep hits from `request.start_line` onward
    ///
    /// A blank pattern yields an empty stream without contacting the remote host.
    pub async fn grep(
        &self,
        request: &GrepRequest,
        checkpoint: ByteOffset,
        cancel: CancellationToken,
    ) -> Result<TextLineStream> {
        if request.pattern.trim().is_empty() {
            return Ok(stream::empty().boxed());
        }
        require_path(&request.path)?;
        if request.start_line < 1 {
            return Err(RtlessError::invalid_argument("start line must be >= 1"));
        }
        if checkpoint.line_number >= request.start_line {
            return Err(RtlessError::invalid_argument(format!(
                "checkpoint line {} does not precede start line {}",
                checkpoint.line_number, request.start_line
            )));
        }
        self.ensure_connected()?;

        let encoding = request.encoding.as_deref();
        let cmd = command::grep(
            &request.path,
            &request.pattern,
            request.flags(),
            request.start_line,
            checkpoint,
            self.to_remote(encoding).as_ref(),
            self.to_local(encoding).as_ref(),
        );
        let start_line = request.start_line;

        let hits = self
            .stream_lines(&cmd, cancel)
            .await?
            .filter_map(move |line| futures::future::ready(parse::parse_grep_hit(&line, start_line)));
        Ok(hits.boxed())
    }

    /// Stream a checkpoint every `interval` lines after `start_offset`, plus a final
    /// one at EOF when the line count is not interval-aligned
    pub async fn create_byte_offset_map(
        &self,
        path: &str,
        interval: u64,
        start_offset: ByteOffset,
        cancel: CancellationToken,
    ) -> Result<CheckpointStream> {
        require_path(path)?;
        if interval == 0 {
            return Err(RtlessError::invalid_argument("checkpoint interval must be > 0"));
        }
        self.ensure_connected()?;

        let cmd = command::byte_offset_map(path, interval, start_offset);
        let checkpoints = self
            .stream_lines(&cmd, cancel)
            .await?
            .filter_map(|line| futures::future::ready(parse::parse_checkpoint(&line)));
        Ok(checkpoints.boxed())
    }

    /// Checkpoint for `target_line`, scanning forward from `start_offset`
    ///
    /// # Returns
    /// * The checkpoint for `target_line`, or for the last line if the file is shorter
    /// * `None` if no line follows `start_offset`
    pub async fn create_offset_until_line(
        &self,
        path: &str,
        start_offset: ByteOffset,
        target_line: u64,
    ) -> Result<Option<ByteOffset>> {
        require_path(path)?;
        if target_line <= start_offset.line_number {
            return Err(RtlessError::invalid_argument(format!(
                "target line {target_line} does not follow checkpoint line {}",
                start_offset.line_number
            )));
        }
        self.ensure_connected()?;

        let cmd = command::offset_until_line(path, start_offset, target_line);
        let output = self.channel.run(&cmd).await?;
        Ok(output.lines().filter_map(parse::parse_checkpoint).last())
    }

    /// Follow lines appended after `start_offset`
    ///
    /// Lines are numbered from `start_offset.line_number + 1`; those at or below
    /// `last_known_line` are skipped so a resumed follow never repeats lines.
    pub async fn tail_follow(
        &self,
        path: &str,
        encoding: Option<&str>,
        start_offset: ByteOffset,
        last_known_line: u64,
        cancel: CancellationToken,
    ) -> Result<TextLineStream> {
        require_path(path)?;
        self.ensure_connected()?;

        let conversion = self.to_local(encoding);
        let cmd = command::tail_follow(path, start_offset, conversion.as_ref());
        let first_line = start_offset.line_number + 1;

        let lines = self
            .stream_lines(&cmd, cancel)
            .await?
            .enumerate()
            .filter_map(move |(i, content)| {
                let line_number = first_line + i as u64;
                futures::future::ready(
                    (line_number > last_known_line)
                        .then(|| TextLine::appended(line_number, content)),
                )
            });
        Ok(lines.boxed())
    }
}

fn require_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        Err(RtlessError::invalid_argument("path must not be empty"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockExecChannel;
    use crate::model::FileObjectKind;

    fn accessor_with(mock: &Arc<MockExecChannel>) -> RemoteFileAccessor {
        RemoteFileAccessor::new(Arc::clone(mock) as Arc<dyn ExecChannel>)
    }

    #[tokio::test]
    async fn test_get_lines_numbers_from_start() {
        let mock = Arc::new(MockExecChannel::new());
        mock.push_lines(["twelve", "thirteen", "fourteen"]);
        let accessor = accessor_with(&mock);

        let lines: Vec<_> = accessor
            .get_lines("/a.log", 12, 14, None, ByteOffset::new(10, 120), CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            lines.iter().map(|l| l.line_number).collect::<Vec<_>>(),
            vec![12, 13, 14]
        );
        assert_eq!(lines[0].content, "twelve");
        assert!(mock.commands()[0].contains("sed -n '2,4p;4q'"));
    }

    #[tokio::test]
    async fn test_get_lines_rejects_bad_ranges_without_remote_call() {
        let mock = Arc::new(MockExecChannel::new());
        let accessor = accessor_with(&mock);
        let cancel = CancellationToken::new();

        for (start, end, checkpoint) in [
            (0, 5, ByteOffset::ZERO),
            (5, 3, ByteOffset::ZERO),
            (5, 8, ByteOffset::new(5, 50)),
        ] {
            let result = accessor
                .get_lines("/a.log", start, end, None, checkpoint, cancel.clone())
                .await;
            assert!(matches!(result, Err(RtlessError::InvalidArgument { .. })));
        }
        assert!(mock.commands().is_empty());
    }

    #[tokio::test]
    async fn test_get_lines_converts_foreign_encoding() {
        let mock = Arc::new(MockExecChannel::new());
        let accessor = accessor_with(&mock);

        let _ = accessor
            .get_lines("/a.log", 1, 2, Some("SHIFT_JIS"), ByteOffset::ZERO, CancellationToken::new())
            .await
            .unwrap();
        let _ = accessor
            .get_lines("/a.log", 1, 2, Some("utf-8"), ByteOffset::ZERO, CancellationToken::new())
            .await
            .unwrap();

        let commands = mock.commands();
        assert!(commands[0].contains("iconv -f 'SHIFT_JIS' -t 'UTF-8//IGNORE'"));
        assert!(!commands[1].contains("iconv"));
    }

    #[tokio::test]
    async fn test_grep_blank_pattern_skips_remote() {
        let mock = Arc::new(MockExecChannel::new());
        let accessor = accessor_with(&mock);

        let hits: Vec<_> = accessor
            .grep(&GrepRequest::new("/a.log", "   "), ByteOffset::ZERO, CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;

        assert!(hits.is_empty());
        assert!(mock.commands().is_empty());
    }

    #[tokio::test]
    async fn test_grep_rebases_hits_and_drops_noise() {
        let mock = Arc::new(MockExecChannel::new());
        mock.push_lines(["1:first", "garbage", "4:fourth"]);
        let accessor = accessor_with(&mock);

        let request = GrepRequest {
            start_line: 50,
            ..GrepRequest::new("/a.log", "ERROR")
        };
        let hits: Vec<_> = accessor
            .grep(&request, ByteOffset::new(40, 800), CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            hits,
            vec![TextLine::new(50, "first"), TextLine::new(53, "fourth")]
        );
        assert!(mock.commands()[0].contains("tail -n +10"));
    }

    #[tokio::test]
    async fn test_grep_converts_pattern_for_foreign_encoding() {
        let mock = Arc::new(MockExecChannel::new());
        let accessor = accessor_with(&mock);

        let request = GrepRequest {
            encoding: Some("EUC-JP".to_string()),
            ..GrepRequest::new("/a.log", "警告")
        };
        let _ = accessor
            .grep(&request, ByteOffset::ZERO, CancellationToken::new())
            .await
            .unwrap();

        let cmd = &mock.commands()[0];
        assert!(cmd.contains("iconv -f 'UTF-8' -t 'EUC-JP'"));
        assert!(cmd.contains("iconv -f 'EUC-JP' -t 'UTF-8//IGNORE'"));
    }

    #[tokio::test]
    async fn test_byte_offset_map_parses_checkpoints() {
        let mock = Arc::new(MockExecChannel::new());
        mock.push_lines(["1000\t52000", "oops", "2000\t104500", "2345\t120000"]);
        let accessor = accessor_with(&mock);

        let checkpoints: Vec<_> = accessor
            .create_byte_offset_map("/a.log", 1000, ByteOffset::ZERO, CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            checkpoints,
            vec![
                ByteOffset::new(1000, 52000),
                ByteOffset::new(2000, 104500),
                ByteOffset::new(2345, 120000)
            ]
        );
    }

    #[tokio::test]
    async fn test_byte_offset_map_rejects_zero_interval() {
        let mock = Arc::new(MockExecChannel::new());
        let accessor = accessor_with(&mock);
        let result = accessor
            .create_byte_offset_map("/a.log", 0, ByteOffset::ZERO, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(RtlessError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_offset_until_line() {
        let mock = Arc::new(MockExecChannel::new());
        mock.push_lines(["150\t3000"]);
        let accessor = accessor_with(&mock);

        let offset = accessor
            .create_offset_until_line("/a.log", ByteOffset::new(100, 2000), 150)
            .await
            .unwrap();
        assert_eq!(offset, Some(ByteOffset::new(150, 3000)));

        let none = accessor
            .create_offset_until_line("/a.log", ByteOffset::new(100, 2000), 150)
            .await
            .unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn test_tail_follow_skips_known_lines() {
        let mock = Arc::new(MockExecChannel::new());
        mock.push_lines(["l11", "l12", "l13", "l14"]);
        let accessor = accessor_with(&mock);

        let lines: Vec<_> = accessor
            .tail_follow("/a.log", None, ByteOffset::new(10, 100), 12, CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            lines,
            vec![TextLine::appended(13, "l13"), TextLine::appended(14, "l14")]
        );
    }

    #[tokio::test]
    async fn test_list_directory_parses_entries() {
        let mock = Arc::new(MockExecChannel::new());
        mock.push_lines([
            "1\t4096\t2024-09-02 10:15\t..",
            "0\t1234\t2024-09-02 10:16\tapp.log",
            "2\t7\t2024-09-02 10:17\tlatest -> app.log",
            "not a listing line",
        ]);
        let accessor = accessor_with(&mock);

        let entries = accessor.list_directory("/var/log").await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].path, "/var/log/app.log");
        assert_eq!(entries[2].kind, FileObjectKind::SymlinkFile);
        assert_eq!(entries[2].link_target.as_deref(), Some("app.log"));
    }

    #[tokio::test]
    async fn test_disconnected_channel_is_not_connected() {
        let mock = Arc::new(MockExecChannel::new());
        mock.disconnect();
        let accessor = accessor_with(&mock);

        assert!(matches!(
            accessor.file_size("/a.log").await,
            Err(RtlessError::NotConnected)
        ));
        assert!(matches!(
            accessor
                .grep(&GrepRequest::new("/a.log", "x"), ByteOffset::ZERO, CancellationToken::new())
                .await,
            Err(RtlessError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_empty_path_is_invalid() {
        let mock = Arc::new(MockExecChannel::new());
        let accessor = accessor_with(&mock);
        assert!(matches!(
            accessor.count_lines("").await,
            Err(RtlessError::InvalidArgument { .. })
        ));
    }
}
