//! Local ↔ remote (`iconv`) encoding names.

/// A supported encoding: the label used locally and the name `iconv` knows it by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingMapping {
    pub local: &'static str,
    pub remote: &'static str,
}

const fn mapping(local: &'static str, remote: &'static str) -> EncodingMapping {
    EncodingMapping { local, remote }
}

pub const ENCODING_MAPPINGS: &[EncodingMapping] = &[
    mapping("utf-8", "UTF-8"),
    mapping("utf-16", "UTF-16"),
    mapping("utf-16le", "UTF-16LE"),
    mapping("utf-16be", "UTF-16BE"),
    mapping("us-ascii", "US-ASCII"),
    mapping("iso-8859-1", "ISO-8859-1"),
    mapping("iso-8859-2", "ISO-8859-2"),
    mapping("iso-8859-15", "ISO-8859-15"),
    mapping("windows-1250", "CP1250"),
    mapping("windows-1251", "CP1251"),
    mapping("windows-1252", "CP1252"),
    mapping("koi8-r", "KOI8-R"),
    mapping("shift_jis", "SHIFT_JIS"),
    mapping("windows-31j", "CP932"),
    mapping("euc-jp", "EUC-JP"),
    mapping("iso-2022-jp", "ISO-2022-JP"),
    mapping("euc-kr", "EUC-KR"),
    mapping("gb2312", "GB2312"),
    mapping("gbk", "GBK"),
    mapping("gb18030", "GB18030"),
    mapping("big5", "BIG5"),
];

fn find_remote(name: &str) -> Option<&'static EncodingMapping> {
    ENCODING_MAPPINGS
        .iter()
        .find(|m| m.remote.eq_ignore_ascii_case(name))
}

/// `iconv` name for a local label
pub fn remote_name_for(local: &str) -> Option<&'static str> {
    ENCODING_MAPPINGS
        .iter()
        .find(|m| m.local.eq_ignore_ascii_case(local))
        .map(|m| m.remote)
}

/// Local label for an `iconv` name
pub fn local_name_for(remote: &str) -> Option<&'static str> {
    find_remote(remote).map(|m| m.local)
}

/// Compare two encoding names ignoring case, `-` and `_`
pub fn same_encoding(a: &str, b: &str) -> bool {
    let normalize = |name: &str| -> String {
        name.chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect()
    };
    normalize(a) == normalize(b)
}

/// Reduce `iconv -l` output to the supported remote names, de-duplicated and sorted
pub fn parse_iconv_list(output: &str) -> Vec<String> {
    let mut names: Vec<String> = output
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|token| token.trim_end_matches('/'))
        .filter(|token| !token.is_empty())
        .filter_map(find_remote)
        .map(|m| m.remote.to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}
