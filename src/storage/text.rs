//! Line-oriented views over text content: head, tail and grep.

use regex::Regex;
use serde::Serialize;

/// A slice of a text file returned by content endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub file_id: String,
    /// Whether the returned lines reach the end of the file.
    pub eof: bool,
    /// Index of the first returned line.
    pub offset: usize,
    /// Size in bytes of `content`.
    pub size: usize,
    pub lines: usize,
    pub content: String,
}

impl FileContent {
    fn from_lines(file_id: &str, offset: usize, eof: bool, lines: &[&str]) -> Self {
        let mut content = String::new();
        for line in lines {
            content.push_str(line);
            content.push('\n');
        }
        Self {
            file_id: file_id.to_string(),
            eof,
            offset,
            size: content.len(),
            lines: lines.len(),
            content,
        }
    }
}

/// First `lines` lines starting at line `offset`.
pub fn head(file_id: &str, data: &[u8], offset: usize, lines: usize) -> FileContent {
    let text = String::from_utf8_lossy(data);
    let all: Vec<&str> = text.lines().collect();
    let start = offset.min(all.len());
    let end = start.saturating_add(lines).min(all.len());
    FileContent::from_lines(file_id, start, end == all.len(), &all[start..end])
}

/// Last `lines` lines.
pub fn tail(file_id: &str, data: &[u8], lines: usize) -> FileContent {
    let text = String::from_utf8_lossy(data);
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    FileContent::from_lines(file_id, start, true, &all[start..])
}

/// Lines matching `pattern`; `max_count` of zero means unlimited.
pub fn grep(file_id: &str, data: &[u8], pattern: &Regex, max_count: usize) -> FileContent {
    let text = String::from_utf8_lossy(data);
    let limit = if max_count == 0 { usize::MAX } else { max_count };
    let matched: Vec<&str> = text
        .lines()
        .filter(|line| pattern.is_match(line))
        .take(limit)
        .collect();
    let eof = matched.len() < limit;
    FileContent::from_lines(file_id, 0, eof, &matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &[u8] = b"chr1\t100\nchr1\t200\nchr2\t300\nchrX\t400\n";

    #[test]
    fn test_head() {
        let content = head("f", TEXT, 1, 2);
        assert_eq!(content.content, "chr1\t200\nchr2\t300\n");
        assert_eq!(content.lines, 2);
        assert_eq!(content.offset, 1);
        assert!(!content.eof);

        let rest = head("f", TEXT, 2, 10);
        assert_eq!(rest.lines, 2);
        assert!(rest.eof);
    }

    #[test]
    fn test_head_offset_past_end() {
        let content = head("f", TEXT, 50, 10);
        assert_eq!(content.lines, 0);
        assert!(content.eof);
    }

    #[test]
    fn test_tail() {
        let content = tail("f", TEXT, 1);
        assert_eq!(content.content, "chrX\t400\n");
        assert_eq!(content.offset, 3);

        assert_eq!(tail("f", TEXT, 100).lines, 4);
    }

    #[test]
    fn test_grep() {
        let pattern = Regex::new("^chr1").unwrap();
        assert_eq!(grep("f", TEXT, &pattern, 0).lines, 2);

        let limited = grep("f", TEXT, &pattern, 1);
        assert_eq!(limited.content, "chr1\t100\n");
        assert!(!limited.eof);
    }
}
