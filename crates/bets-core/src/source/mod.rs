//! Record sources.
//!
//! A source yields raw record lines in order, one logical record per line.
//! Blank lines are skipped and line endings (`\n`, `\r\n`) are stripped.

mod archive;

pub use archive::open_named_entry;

use crate::error::{Result, SourceError};
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

/// Sequential reader of raw record lines.
pub trait RecordSource: Send {
    /// Next non-blank line, or `None` once the source is exhausted.
    fn next_line(&mut self) -> Result<Option<String>>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> &str;
}

/// Line-oriented source over any buffered reader.
pub struct LineSource {
    reader: Box<dyn BufRead + Send>,
    label: String,
}

impl LineSource {
    /// Wrap a buffered reader.
    pub fn new(reader: impl BufRead + Send + 'static, label: impl Into<String>) -> Self {
        Self {
            reader: Box::new(reader),
            label: label.into(),
        }
    }

    /// Read records from a plain delimited file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| SourceError::ArchiveOpen {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }

    /// Serve lines from memory.
    pub fn from_lines<I, L>(lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let mut text = String::new();
        for line in lines {
            text.push_str(line.as_ref());
            text.push('\n');
        }
        Self::new(Cursor::new(text.into_bytes()), "memory")
    }
}

impl RecordSource for LineSource {
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .map_err(|e| SourceError::Read(format!("{}: {}", self.label, e)))?;
            if n == 0 {
                return Ok(None);
            }

            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }

            return Ok(Some(trimmed.to_string()));
        }
    }

    fn describe(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(source: &mut dyn RecordSource) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = source.next_line().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_from_lines() {
        let mut source = LineSource::from_lines(["a,b", "c,d"]);
        assert_eq!(drain(&mut source), vec!["a,b", "c,d"]);
        assert!(source.next_line().unwrap().is_none());
    }

    #[test]
    fn test_strips_crlf_and_skips_blank_lines() {
        let text = "a,b\r\n\r\n\nc,d\n\n";
        let mut source = LineSource::new(Cursor::new(text.as_bytes().to_vec()), "crlf");
        assert_eq!(drain(&mut source), vec!["a,b", "c,d"]);
    }

    #[test]
    fn test_last_line_without_newline() {
        let mut source = LineSource::new(Cursor::new(b"a\nb".to_vec()), "tail");
        assert_eq!(drain(&mut source), vec!["a", "b"]);
    }

    #[test]
    fn test_invalid_utf8_is_read_error() {
        let mut source = LineSource::new(Cursor::new(vec![0xff, 0xfe, b'\n']), "bad");
        let err = source.next_line().unwrap_err();
        assert!(matches!(err, crate::Error::Source(SourceError::Read(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("agency-1.csv");
        std::fs::write(&path, "a,b,1,2000-01-01,10\n").unwrap();

        let mut source = LineSource::from_file(&path).unwrap();
        assert!(source.describe().ends_with("agency-1.csv"));
        assert_eq!(drain(&mut source), vec!["a,b,1,2000-01-01,10"]);
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = LineSource::from_file(&dir.path().join("missing.csv"));
        assert!(result.is_err());
    }
}
