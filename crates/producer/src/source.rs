//! Record sources.
//!
//! A source yields flat JSON records in stream order. Parsing/normalizing the
//! upstream format (CSV, column renames) happens before records land here;
//! the producer only requires a stable schema.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unparseable record at line {line}: {detail}")]
    Parse { line: usize, detail: String },
}

/// A bounded or unbounded sequence of records.
///
/// `Ok(None)` signals clean exhaustion; an `Err` covers one bad record and
/// the source remains usable for the next call (failure isolation).
pub trait RecordSource: Send {
    fn next_record(&mut self) -> Result<Option<JsonValue>, SourceError>;
}

/// JSON-lines file source: one flat JSON object per line, blank lines
/// skipped.
pub struct JsonLinesSource {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl JsonLinesSource {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

impl RecordSource for JsonLinesSource {
    fn next_record(&mut self) -> Result<Option<JsonValue>, SourceError> {
        loop {
            self.line_no += 1;
            match self.lines.next() {
                None => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(line)) if line.trim().is_empty() => continue,
                Some(Ok(line)) => {
                    return serde_json::from_str(&line).map(Some).map_err(|e| {
                        SourceError::Parse {
                            line: self.line_no,
                            detail: e.to_string(),
                        }
                    });
                }
            }
        }
    }
}

/// In-memory source for tests.
pub struct VecSource {
    records: std::vec::IntoIter<JsonValue>,
}

impl VecSource {
    pub fn new(records: Vec<JsonValue>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }
}

impl RecordSource for VecSource {
    fn next_record(&mut self) -> Result<Option<JsonValue>, SourceError> {
        Ok(self.records.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_json_lines_and_skips_blanks() {
        let mut file = tempfile_path("driftwatch-source-ok");
        writeln!(file.1, r#"{{"date":"2021-03-01T00:00:00Z","high":1.0}}"#).unwrap();
        writeln!(file.1).unwrap();
        writeln!(file.1, r#"{{"date":"2021-03-01T01:00:00Z","high":2.0}}"#).unwrap();
        file.1.flush().unwrap();

        let mut source = JsonLinesSource::open(&file.0).unwrap();
        assert!(source.next_record().unwrap().is_some());
        assert!(source.next_record().unwrap().is_some());
        assert!(source.next_record().unwrap().is_none());
        std::fs::remove_file(&file.0).ok();
    }

    #[test]
    fn bad_line_does_not_poison_the_source() {
        let mut file = tempfile_path("driftwatch-source-bad");
        writeln!(file.1, "not json").unwrap();
        writeln!(file.1, r#"{{"date":"2021-03-01T00:00:00Z","high":1.0}}"#).unwrap();
        file.1.flush().unwrap();

        let mut source = JsonLinesSource::open(&file.0).unwrap();
        assert!(matches!(
            source.next_record(),
            Err(SourceError::Parse { line: 1, .. })
        ));
        // The next record is still reachable.
        assert!(source.next_record().unwrap().is_some());
        std::fs::remove_file(&file.0).ok();
    }

    fn tempfile_path(stem: &str) -> (std::path::PathBuf, File) {
        let path = std::env::temp_dir().join(format!("{stem}-{}.jsonl", std::process::id()));
        let file = File::create(&path).unwrap();
        (path, file)
    }
}
