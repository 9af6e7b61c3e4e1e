//! Record sources: CSV rows and newline-delimited JSON objects.
//!
//! A [`RecordReader`] makes a single forward pass over the input file and
//! yields one [`SourceRecord`] per row/line. Malformed rows and lines are
//! yielded as per-record errors so the caller can skip and report them; only
//! I/O failures and an unsupported extension are fatal.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

/// An ordered field mapping decoded from one input row or line.
pub type RawRecord = JsonMap<String, JsonValue>;

/// A raw record together with the physical line it came from.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub line: u64,
    pub record: RawRecord,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("unsupported input format `.{extension}` (expected .csv, .json or .log)")]
    UnsupportedFormat { extension: String },
    #[error("failed to read CSV header: {0}")]
    Header(#[source] csv::Error),
    #[error("row at line {line}: expected {expected} fields per the header, found {found}")]
    MalformedRow {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: invalid record: {message}")]
    MalformedRecord { line: u64, message: String },
    #[error("line {line}: top-level value is not an object")]
    NotAnObject { line: u64 },
    #[error("failed to read input file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecordError {
    /// Fatal errors abort the run; everything else is skip-and-report.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat { .. } | Self::Header(_) | Self::Io { .. }
        )
    }

    /// Physical input line the error refers to, when known.
    pub fn line(&self) -> Option<u64> {
        match self {
            Self::MalformedRow { line, .. }
            | Self::MalformedRecord { line, .. }
            | Self::NotAnObject { line } => Some(*line),
            _ => None,
        }
    }
}

/// Input family selected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// Comma-separated rows, first row is the header.
    Csv,
    /// One self-describing JSON object per line.
    NdJson,
}

impl RecordFormat {
    pub fn from_path(path: &Path) -> Result<Self, RecordError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "json" | "log" => Ok(Self::NdJson),
            _ => Err(RecordError::UnsupportedFormat { extension }),
        }
    }
}

/// Lazy, single-pass reader over one input file.
pub struct RecordReader {
    path: PathBuf,
    inner: ReaderKind,
}

impl fmt::Debug for RecordReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.inner {
            ReaderKind::Csv { .. } => "Csv",
            ReaderKind::NdJson { .. } => "NdJson",
        };
        f.debug_struct("RecordReader")
            .field("path", &self.path)
            .field("inner", &kind)
            .finish()
    }
}

enum ReaderKind {
    Csv {
        header: Vec<String>,
        rows: csv::StringRecordsIntoIter<File>,
    },
    NdJson {
        lines: Lines<BufReader<File>>,
        line: u64,
    },
}

impl RecordReader {
    pub fn open(path: &Path) -> Result<Self, RecordError> {
        let format = RecordFormat::from_path(path)?;
        let file = File::open(path).map_err(|source| RecordError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let inner = match format {
            RecordFormat::Csv => {
                // flexible(true) so short/long rows surface as MalformedRow
                // with field counts instead of an opaque csv error.
                let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
                let header: Vec<String> = reader
                    .headers()
                    .map_err(RecordError::Header)?
                    .iter()
                    .map(str::to_string)
                    .collect();
                ReaderKind::Csv {
                    header,
                    rows: reader.into_records(),
                }
            }
            RecordFormat::NdJson => ReaderKind::NdJson {
                lines: BufReader::new(file).lines(),
                line: 0,
            },
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }
}

impl Iterator for RecordReader {
    type Item = Result<SourceRecord, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next_record(&self.path)
    }
}

impl ReaderKind {
    fn next_record(&mut self, path: &Path) -> Option<Result<SourceRecord, RecordError>> {
        match self {
            Self::Csv { header, rows } => next_csv_record(header, rows, path),
            Self::NdJson { lines, line } => next_ndjson_record(lines, line, path),
        }
    }
}

fn next_csv_record(
    header: &[String],
    rows: &mut csv::StringRecordsIntoIter<File>,
    path: &Path,
) -> Option<Result<SourceRecord, RecordError>> {
    let row = match rows.next()? {
        Ok(row) => row,
        Err(err) => return Some(Err(csv_row_error(err, path))),
    };

    let line = row.position().map(|pos| pos.line()).unwrap_or_default();
    if row.len() != header.len() {
        return Some(Err(RecordError::MalformedRow {
            line,
            expected: header.len(),
            found: row.len(),
        }));
    }

    let mut record = RawRecord::new();
    for (name, value) in header.iter().zip(row.iter()) {
        record.insert(name.clone(), JsonValue::String(value.to_string()));
    }
    Some(Ok(SourceRecord { line, record }))
}

fn next_ndjson_record(
    lines: &mut Lines<BufReader<File>>,
    line: &mut u64,
    path: &Path,
) -> Option<Result<SourceRecord, RecordError>> {
    loop {
        *line += 1;
        let text = match lines.next()? {
            Ok(text) => text,
            Err(source) => {
                return Some(Err(RecordError::Io {
                    path: path.to_path_buf(),
                    source,
                }));
            }
        };
        if text.trim().is_empty() {
            continue;
        }

        let current = *line;
        return Some(match serde_json::from_str::<JsonValue>(&text) {
            Ok(JsonValue::Object(record)) => Ok(SourceRecord {
                line: current,
                record,
            }),
            Ok(_) => Err(RecordError::NotAnObject { line: current }),
            Err(err) => Err(RecordError::MalformedRecord {
                line: current,
                message: err.to_string(),
            }),
        });
    }
}

fn csv_row_error(err: csv::Error, path: &Path) -> RecordError {
    let line = err.position().map(|pos| pos.line()).unwrap_or_default();
    if err.is_io_error() {
        match err.into_kind() {
            csv::ErrorKind::Io(source) => RecordError::Io {
                path: path.to_path_buf(),
                source,
            },
            _ => unreachable!("is_io_error guarantees an Io kind"),
        }
    } else {
        RecordError::MalformedRecord {
            line,
            message: err.to_string(),
        }
    }
}
