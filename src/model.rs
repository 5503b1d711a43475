//! Domain records exchanged between the accessor, the index and the operations.

use chrono::NaiveDateTime;

/// A checkpoint mapping a line number to the byte count that ends it.
///
/// `bytes` is the cumulative size of the file up to and including the terminator of
/// `line_number`, so `tail -c +(bytes + 1)` starts at the first byte of the next line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteOffset {
    pub line_number: u64,
    pub bytes: u64,
}

impl ByteOffset {
    /// Start-of-file sentinel; always a safe seek point.
    pub const ZERO: ByteOffset = ByteOffset {
        line_number: 0,
        bytes: 0,
    };

    pub const fn new(line_number: u64, bytes: u64) -> Self {
        Self { line_number, bytes }
    }

    /// One-based byte position for `tail -c +N`
    pub fn tail_start(&self) -> u64 {
        self.bytes + 1
    }
}

/// A single line of the remote file with its absolute (1-based) line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    pub line_number: u64,
    pub content: String,
    /// Set for lines discovered by tail-follow. Provenance only, never used for ordering.
    pub appended: bool,
}

impl TextLine {
    pub fn new(line_number: u64, content: impl Into<String>) -> Self {
        Self {
            line_number,
            content: content.into(),
            appended: false,
        }
    }

    pub fn appended(line_number: u64, content: impl Into<String>) -> Self {
        Self {
            line_number,
            content: content.into(),
            appended: true,
        }
    }
}

/// Entry kind reported by a remote directory listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileObjectKind {
    File,
    Directory,
    SymlinkFile,
    SymlinkDirectory,
}

impl FileObjectKind {
    /// Decode the numeric type code emitted by the listing classifier
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::File),
            1 => Some(Self::Directory),
            2 => Some(Self::SymlinkFile),
            3 => Some(Self::SymlinkDirectory),
            _ => None,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory | Self::SymlinkDirectory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::SymlinkFile | Self::SymlinkDirectory)
    }
}

/// A file or directory on the remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemObject {
    pub path: String,
    pub name: String,
    pub kind: FileObjectKind,
    pub size: u64,
    /// `None` when the listing timestamp could not be parsed
    pub last_modified: Option<NaiveDateTime>,
    pub link_target: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_start_is_one_based() {
        assert_eq!(ByteOffset::ZERO.tail_start(), 1);
        assert_eq!(ByteOffset::new(10, 120).tail_start(), 121);
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(FileObjectKind::from_code(0), Some(FileObjectKind::File));
        assert_eq!(
            FileObjectKind::from_code(3),
            Some(FileObjectKind::SymlinkDirectory)
        );
        assert_eq!(FileObjectKind::from_code(9), None);
        assert!(FileObjectKind::SymlinkDirectory.is_directory());
        assert!(!FileObjectKind::SymlinkFile.is_directory());
    }

    #[test]
    fn test_appended_flag() {
        assert!(!TextLine::new(1, "a").appended);
        assert!(TextLine::appended(1, "a").appended);
    }
}
