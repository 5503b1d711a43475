//! Remote command execution channel.
//!
//! The engine never talks to the remote host directly; it hands finished shell command
//! strings to an [`ExecChannel`] and reads back text. Connection setup and
//! authentication live behind this trait.

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod shell;

#[cfg(test)]
pub mod mock;

pub use shell::ShellChannel;

#[cfg(test)]
pub use mock::MockExecChannel;

/// Bounded stream of stdout lines (terminator stripped).
///
/// The producer stops, and the remote command is torn down, once the cancellation
/// token passed to [`ExecChannel::run_streaming`] fires or the receiver is dropped.
pub type LineReceiver = mpsc::Receiver<String>;

/// Core trait for running shell commands on the remote host.
///
/// Implementations must be thread-safe. Remote command failure is indistinguishable
/// from empty output: callers compose commands that swallow stderr and exit codes.
#[async_trait]
pub trait ExecChannel: Send + Sync {
    /// Whether the channel currently has a live connection
    fn is_connected(&self) -> bool;

    /// Run a command to completion and return its whole stdout
    async fn run(&self, command: &str) -> Result<String>;

    /// Run a command and stream its stdout line by line
    ///
    /// # Returns
    /// * A bounded receiver; it closes when the command exits or `cancel` fires
    async fn run_streaming(&self, command: &str, cancel: CancellationToken)
        -> Result<LineReceiver>;
}
