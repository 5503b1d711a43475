//! Sparse line-to-byte checkpoint index
//!
//! The index stores a handful of `(line, bytes)` checkpoints (one every few thousand
//! lines) for a remote file. Range reads and greps ask it for the closest checkpoint
//! strictly before the line they need, then let the remote side scan forward from there.
//!
//! Checkpoints are append-only and strictly ascending by line number. An insert that
//! would break the ordering is rejected and logged; it never panics. Because ordering
//! is enforced, lookups use binary search.

use crate::model::ByteOffset;
use log::warn;
use parking_lot::RwLock;
use std::sync::Arc;

/// Index shared between a session and its operations.
///
/// Only one index-extending operation runs per session at a time; the lock exists to
/// satisfy aliasing rules, not to arbitrate writers.
pub type SharedIndex = Arc<RwLock<ByteOffsetIndex>>;

#[derive(Debug, Default, Clone)]
pub struct ByteOffsetIndex {
    /// Ascending by `line_number` (and therefore by `bytes`)
    checkpoints: Vec<ByteOffset>,
}

impl ByteOffsetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Append a checkpoint
    ///
    /// # Returns
    /// * `true` if the checkpoint was appended
    /// * `false` if its line number does not exceed the last checkpoint's (ignored)
    pub fn add(&mut self, checkpoint: ByteOffset) -> bool {
        if let Some(last) = self.checkpoints.last() {
            if checkpoint.line_number <= last.line_number {
                warn!(
                    "ignoring out-of-order checkpoint {:?} (last is {:?})",
                    checkpoint, last
                );
                return false;
            }
        }
        self.checkpoints.push(checkpoint);
        true
    }

    /// Append checkpoints in order; equivalent to calling `add` for each one
    ///
    /// # Returns
    /// * Number of checkpoints actually appended
    pub fn add_range<I>(&mut self, checkpoints: I) -> usize
    where
        I: IntoIterator<Item = ByteOffset>,
    {
        checkpoints
            .into_iter()
            .filter(|checkpoint| self.add(*checkpoint))
            .count()
    }

    /// Floor-exclusive lookup
    ///
    /// Returns the last checkpoint whose line number is strictly below `target_line`,
    /// or `ByteOffset::ZERO` if there is none. Seeking there and scanning forward
    /// always reaches `target_line`.
    pub fn find(&self, target_line: u64) -> ByteOffset {
        let idx = self
            .checkpoints
            .partition_point(|checkpoint| checkpoint.line_number < target_line);
        if idx == 0 {
            ByteOffset::ZERO
        } else {
            self.checkpoints[idx - 1]
        }
    }

    /// Most recent checkpoint, or the sentinel when empty
    pub fn find_last(&self) -> ByteOffset {
        self.checkpoints.last().copied().unwrap_or(ByteOffset::ZERO)
    }

    pub fn reset(&mut self) {
        self.checkpoints.clear();
    }

    pub fn count(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn checkpoints(&self) -> &[ByteOffset] {
        &self.checkpoints
    }
}
