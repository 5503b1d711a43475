//! # rtless - Remote Log Browsing Engine
//!
//! Browse, search and follow multi-gigabyte log files that live on a remote host reachable
//! only through a command-execution channel. Nothing is installed remotely and the file is
//! never transferred whole: every request becomes a disposable POSIX shell pipeline.
//!
//! ## Features
//!
//! - **Sparse Line Index**: line-to-byte checkpoints let range reads and greps seek with
//!   `tail -c +N` instead of scanning from the top
//! - **Streaming Operations**: index build, grep, range export and tail-follow stream their
//!   results with live progress and cooperative cancellation
//! - **Encoding Aware**: files in a foreign encoding are converted through remote `iconv`
//! - **Batching**: a time-windowed aggregator turns item streams into bulk updates
//!
//! ## Architecture
//!
//! - [`error`] - Centralized error types and handling
//! - [`exec`] - The command-execution channel abstraction and its shell implementation
//! - [`index`] - The sparse checkpoint index
//! - [`remote`] - Command composition and output parsing
//! - [`operation`] - Cancellable streaming operations and the cancellation registry
//! - [`batch`] - Time-windowed batch aggregation
//! - [`session`] - Per-file ownership of index, registry and operations
//! - [`config`] - Engine tuning knobs

// Core modules
pub mod error;
pub mod model;

// Remote access
pub mod exec;
pub mod remote;

// Engine
pub mod batch;
pub mod config;
pub mod index;
pub mod operation;
pub mod session;

// Re-export commonly used types for convenience
pub use error::{Result, RtlessError};

// Public API surface for external usage
pub use batch::{chunk_for_add_range, Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use exec::{ExecChannel, ShellChannel};
pub use index::{ByteOffsetIndex, SharedIndex};
pub use model::{ByteOffset, FileObjectKind, FileSystemObject, TextLine};
pub use operation::{
    BuildByteOffsetMapOperation, GrepOperation, OperationHandle, OperationRegistry,
    SaveRangeContentOperation, TailFollowOperation,
};
pub use remote::{GrepRequest, RemoteFileAccessor};
pub use session::{FileSession, OpenFile};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
