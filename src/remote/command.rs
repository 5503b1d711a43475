//! Shell pipeline composition.
//!
//! Every builder here returns a complete POSIX `sh` command string. Each pipeline
//! discards stderr and ends in `|| true`, so a failing remote tool degrades to empty or
//! partial output instead of an exit status. All path and pattern literals go through
//! [`quote`].

use crate::model::ByteOffset;

/// Wrap a literal in single quotes, escaping embedded quotes as `'\''`
pub fn quote(literal: &str) -> String {
    let mut quoted = String::with_capacity(literal.len() + 2);
    quoted.push('\'');
    for ch in literal.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// An `iconv` step between two encodings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub from: String,
    pub to: String,
}

impl Conversion {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Pipeline stage converting a byte stream; unconvertible input is dropped
    fn stage(&self) -> String {
        format!(
            "iconv -f {} -t {} 2>/dev/null",
            quote(&self.from),
            quote(&format!("{}//IGNORE", self.to))
        )
    }

    /// Assign `literal` converted to the target encoding to shell variable `var`,
    /// failing when the conversion leaves nothing behind
    fn assign(&self, var: &str, literal: &str) -> String {
        format!(
            "{var}=\"$(printf '%s' {} | iconv -f {} -t {} 2>/dev/null)\" && [ -n \"${var}\" ]",
            quote(literal),
            quote(&self.from),
            quote(&self.to)
        )
    }
}

/// Byte stream of `path` starting at the line after `checkpoint`
fn seek(path: &str, checkpoint: ByteOffset) -> String {
    format!(
        "tail -c +{} {} 2>/dev/null",
        checkpoint.tail_start(),
        quote(path)
    )
}

/// [`seek`] followed by an empty line and a sentinel line.
///
/// The last two records of this stream are never complete lines of the file: either the
/// empty line after a final newline, or an unterminated partial line joined to it.
fn seek_sealed(path: &str, checkpoint: ByteOffset) -> String {
    format!("{{ {}; printf '\\n#\\n'; }}", seek(path, checkpoint))
}

fn with_conversion(pipeline: String, conversion: Option<&Conversion>) -> String {
    match conversion {
        Some(conversion) => format!("{pipeline} | {}", conversion.stage()),
        None => pipeline,
    }
}

/// Awk classifier for `ls -al --time-style=long-iso` output.
///
/// Emits `code<TAB>size<TAB>date time<TAB>display` where code is 0 file, 1 directory,
/// 2 symlink to file, 3 symlink to directory. Runs inside the listed directory so
/// symlink names can be tested directly. Expects `q` to hold a single quote.
const LIST_CLASSIFIER: &str = r#"$1 == "total" { next }
NF >= 8 {
  kind = substr($1, 1, 1)
  name = $0
  for (i = 0; i < 7; i++) sub(/^[^ ]+ +/, "", name)
  if (name == ".") next
  code = 0
  if (kind == "d") code = 1
  else if (kind == "l") {
    link = name
    sub(/ -> .*$/, "", link)
    gsub(q, q "\\\\" q q, link)
    code = (system("[ -d " q link q " ]") == 0) ? 3 : 2
  }
  printf "%d\t%s\t%s %s\t%s\n", code, $5, $6, $7, name
}"#;

pub fn list_directory(path: &str) -> String {
    format!(
        "cd {} 2>/dev/null && ls -al --time-style=long-iso 2>/dev/null | awk -v q=\"'\" {} || true",
        quote(path),
        quote(LIST_CLASSIFIER)
    )
}

pub fn list_encodings() -> String {
    "iconv -l 2>/dev/null || true".to_string()
}

pub fn file_size(path: &str) -> String {
    format!("wc -c < {} 2>/dev/null || echo 0", quote(path))
}

pub fn count_lines(path: &str) -> String {
    format!("wc -l < {} 2>/dev/null || echo 0", quote(path))
}

/// Lines `start_line..=end_line`, seeking from `checkpoint` (which must precede them)
pub fn read_range(
    path: &str,
    start_line: u64,
    end_line: u64,
    checkpoint: ByteOffset,
    conversion: Option<&Conversion>,
) -> String {
    let first = start_line - checkpoint.line_number;
    let last = end_line - checkpoint.line_number;
    let pipeline = format!(
        "{} | sed -n '{first},{last}p;{last}q' 2>/dev/null",
        seek(path, checkpoint)
    );
    format!("{} || true", with_conversion(pipeline, conversion))
}

/// Options for a grep pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrepFlags {
    pub max_results: u64,
    pub ignore_case: bool,
    pub use_regex: bool,
}

/// Grep `pattern` from `start_line` onward, seeking from `checkpoint`.
///
/// Output lines are `<n>:<content>` where `n` is 1 for `start_line`.
/// `pattern_conversion` converts the pattern into the file encoding;
/// `output_conversion` converts hits back into the local encoding.
pub fn grep(
    path: &str,
    pattern: &str,
    flags: GrepFlags,
    start_line: u64,
    checkpoint: ByteOffset,
    pattern_conversion: Option<&Conversion>,
    output_conversion: Option<&Conversion>,
) -> String {
    let mut pipeline = seek(path, checkpoint);

    let skip = start_line.saturating_sub(checkpoint.line_number);
    if skip > 1 {
        pipeline.push_str(&format!(" | tail -n +{skip} 2>/dev/null"));
    }

    let mut grep = String::from("grep -a -n");
    grep.push_str(if flags.use_regex { " -E" } else { " -F" });
    if flags.ignore_case {
        grep.push_str(" -i");
    }
    if flags.max_results > 0 {
        grep.push_str(&format!(" -m {}", flags.max_results));
    }
    let (guard, pattern_arg) = match pattern_conversion {
        Some(conversion) => (
            format!("{} && ", conversion.assign("pat", pattern)),
            "\"$pat\"".to_string(),
        ),
        None => (String::new(), quote(pattern)),
    };
    pipeline.push_str(&format!(" | {grep} -e {pattern_arg} 2>/dev/null"));

    format!("{guard}{} || true", with_conversion(pipeline, output_conversion))
}

/// Awk rule counting bytes of complete lines; `LC_ALL=C` makes `length` count bytes.
///
/// Reads a [`seek_sealed`] stream, so a record is only counted once two more follow it.
/// `n` is the number of complete lines counted so far.
const ACCUMULATE: &str = "NR > 2 { acc += held + 1; n = NR - 2 }";

/// Shifts record lengths through the two-record delay of [`ACCUMULATE`]
const SHIFT: &str = "{ held = prev; prev = length($0) }";

/// Checkpoint every `interval` complete lines after `start_offset`, plus one for the
/// last complete line if unaligned. An unterminated final line gets no checkpoint.
pub fn byte_offset_map(path: &str, interval: u64, start_offset: ByteOffset) -> String {
    let script = format!(
        "{ACCUMULATE} \
         NR > 2 && n % step == 0 {{ printf \"%.0f\\t%.0f\\n\", base_line + n, base_bytes + acc }} \
         {SHIFT} \
         END {{ if (n > 0 && n % step != 0) printf \"%.0f\\t%.0f\\n\", base_line + n, base_bytes + acc }}"
    );
    format!(
        "{} | LC_ALL=C awk -v base_line={} -v base_bytes={} -v step={} {} 2>/dev/null || true",
        seek_sealed(path, start_offset),
        start_offset.line_number,
        start_offset.bytes,
        interval,
        quote(&script)
    )
}

/// Checkpoint for `target_line`, or for the last complete line if EOF comes first
pub fn offset_until_line(path: &str, start_offset: ByteOffset, target_line: u64) -> String {
    let script = format!(
        "{ACCUMULATE} \
         NR > 2 && n == stop {{ printf \"%.0f\\t%.0f\\n\", base_line + n, base_bytes + acc; done = 1; exit }} \
         {SHIFT} \
         END {{ if (!done && n > 0) printf \"%.0f\\t%.0f\\n\", base_line + n, base_bytes + acc }}"
    );
    format!(
        "{} | LC_ALL=C awk -v base_line={} -v base_bytes={} -v stop={} {} 2>/dev/null || true",
        seek_sealed(path, start_offset),
        start_offset.line_number,
        start_offset.bytes,
        target_line - start_offset.line_number,
        quote(&script)
    )
}

/// Follow appended content from the line after `start_offset`
pub fn tail_follow(path: &str, start_offset: ByteOffset, conversion: Option<&Conversion>) -> String {
    let pipeline = format!(
        "tail -c +{} -f {} 2>/dev/null",
        start_offset.tail_start(),
        quote(path)
    );
    format!("{} || true", with_conversion(pipeline, conversion))
}
