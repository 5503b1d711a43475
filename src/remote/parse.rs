//! Parsers for the line-oriented output of composed commands.
//!
//! A shell pipeline has no schema guarantee, so every parser returns `None` for a line
//! it does not understand and the caller drops it.

use crate::model::{ByteOffset, FileObjectKind, FileSystemObject, TextLine};
use chrono::NaiveDateTime;
use log::trace;

const LISTING_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// `<line><TAB><bytes>`
pub fn parse_checkpoint(line: &str) -> Option<ByteOffset> {
    let (line_number, bytes) = line.trim().split_once('\t')?;
    let parsed = ByteOffset::new(line_number.parse().ok()?, bytes.parse().ok()?);
    Some(parsed)
}

/// `<relative line>:<content>`, rebased so relative line 1 is `start_line`
pub fn parse_grep_hit(line: &str, start_line: u64) -> Option<TextLine> {
    let (relative, content) = line.split_once(':')?;
    let relative: u64 = relative.parse().ok()?;
    if relative == 0 {
        return None;
    }
    Some(TextLine::new(relative + start_line - 1, content))
}

/// `<code><TAB><size><TAB><date time><TAB><display>` from the listing classifier
pub fn parse_listing_entry(line: &str, directory: &str) -> Option<FileSystemObject> {
    let mut fields = line.splitn(4, '\t');
    let code: u8 = fields.next()?.parse().ok()?;
    let size: u64 = fields.next()?.parse().ok()?;
    let timestamp = fields.next()?;
    let display = fields.next()?;
    let kind = FileObjectKind::from_code(code)?;

    let (name, link_target) = match display.split_once(" -> ") {
        Some((name, target)) if kind.is_symlink() => (name, Some(target.to_string())),
        _ => (display, None),
    };
    if name.is_empty() || name == "." {
        return None;
    }

    let last_modified = NaiveDateTime::parse_from_str(timestamp, LISTING_TIME_FORMAT).ok();
    if last_modified.is_none() {
        trace!("unparsed listing timestamp {timestamp:?} for {name}");
    }

    Some(FileSystemObject {
        path: join_path(directory, name),
        name: name.to_string(),
        kind,
        size,
        last_modified,
        link_target,
    })
}

/// A single unsigned number such as `wc` prints
pub fn parse_count(output: &str) -> u64 {
    output
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .unwrap_or(0)
}

pub fn join_path(directory: &str, name: &str) -> String {
    if directory.is_empty() {
        name.to_string()
    } else if directory.ends_with('/') {
        format!("{directory}{name}")
    } else {
        format!("{directory}/{name}")
    }
}
