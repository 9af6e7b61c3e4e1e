//! Input parsing: turning a CSV or NDJSON file into a stream of raw records.

mod records;

pub use records::{RawRecord, RecordError, RecordFormat, RecordReader, SourceRecord};
