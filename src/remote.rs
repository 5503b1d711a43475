//! Remote file access through composed shell pipelines.
//!
//! This module turns domain requests (list a directory, read lines N..M, grep, build or
//! extend the offset map, follow the tail) into POSIX shell commands, and parses their
//! line-oriented output back into records.

pub mod accessor;
pub mod command;
pub mod encoding;
pub mod parse;

pub use accessor::{
    CheckpointStream, GrepRequest, RemoteFileAccessor, TextLineStream, DEFAULT_LOCAL_ENCODING,
};
pub use encoding::{EncodingMapping, ENCODING_MAPPINGS};
