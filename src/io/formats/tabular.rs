//! Delimited text record source.
//!
//! Uses the `csv` crate with flexible record lengths, so quoted fields may
//! contain delimiters and newlines and short rows reach the column-count
//! guard instead of failing the parser.

use crate::config::{ColumnMismatchPolicy, Encoding, ImportConfig};
use crate::io::locator::{Resource, SourceInput};
use crate::io::traits::{RawRecord, RecordBody, RecordSource};
use crate::{Error, Result};
use std::io::BufRead;
use std::sync::Arc;

type CsvReader = csv::Reader<Box<dyn BufRead + Send>>;

/// Reader options of a tabular source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularOptions {
    /// Field delimiter.
    pub delimiter: u8,
    /// Enclosure (quote) character.
    pub quote: u8,
    /// Number of header rows before the data.
    pub header_rows: usize,
    /// Encoding every record must be valid in.
    pub encoding: Encoding,
    /// Maximum raw record length in bytes, 0 for unlimited.
    pub max_line_length: usize,
    /// Minimum number of columns, guarded only when greater than 1.
    pub required_columns: usize,
    /// What a short record does.
    pub on_column_mismatch: ColumnMismatchPolicy,
}

impl Default for TabularOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            header_rows: 1,
            encoding: Encoding::utf8(),
            max_line_length: 0,
            required_columns: 0,
            on_column_mismatch: ColumnMismatchPolicy::Fail,
        }
    }
}

impl TabularOptions {
    /// Derives the options from an import configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the delimiter is not one byte.
    pub fn from_config(config: &ImportConfig) -> Result<Self> {
        Ok(Self {
            delimiter: config.input.delimiter_byte()?,
            quote: config.input.enclosure,
            header_rows: config.input.header,
            encoding: config.input.encoding,
            max_line_length: config.input.max_line_length,
            required_columns: config.required_column_count(),
            on_column_mismatch: config.input.on_column_mismatch,
        })
    }
}

/// Record source over delimited text.
pub struct TabularSource {
    name: String,
    input: SourceInput,
    options: TabularOptions,
    reader: Option<CsvReader>,
    headers: Arc<Vec<String>>,
    serial: u64,
}

impl TabularSource {
    /// Creates a source over a resource.
    #[must_use]
    pub fn new(resource: &Resource, options: TabularOptions) -> Self {
        Self {
            name: resource.name.clone(),
            input: resource.input.clone(),
            options,
            reader: None,
            headers: Arc::new(Vec::new()),
            serial: 0,
        }
    }

    /// First header row, available once reading has started.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn open_reader(&self) -> Result<CsvReader> {
        Ok(csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.options.delimiter)
            .quote(self.options.quote)
            .from_reader(self.input.open()?))
    }

    fn read_raw(&self, reader: &mut CsvReader, record: &mut csv::ByteRecord) -> Result<bool> {
        reader
            .read_byte_record(record)
            .map_err(|e| Error::in_source(&self.name, e))
    }

    /// Reopens the input and consumes the header rows.
    fn restart(&mut self) -> Result<()> {
        let mut reader = self.open_reader()?;
        let mut row = csv::ByteRecord::new();
        let mut headers = Vec::new();
        for i in 0..self.options.header_rows {
            if !self.read_raw(&mut reader, &mut row)? {
                break;
            }
            if i == 0 {
                headers = row
                    .iter()
                    .map(|field| {
                        self.options
                            .encoding
                            .decode(field)
                            .unwrap_or_else(|_| String::from_utf8_lossy(field).into_owned())
                    })
                    .collect();
            }
        }
        self.headers = Arc::new(headers);
        self.reader = Some(reader);
        self.serial = 0;
        Ok(())
    }

    fn raw_text(&self, row: &csv::ByteRecord) -> String {
        let delimiter = char::from(self.options.delimiter).to_string();
        row.iter()
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(&delimiter)
    }

    fn decode_row(&self, serial: u64, row: &csv::ByteRecord) -> Result<Vec<String>> {
        row.iter()
            .enumerate()
            .map(|(i, field)| {
                self.options.encoding.decode(field).map_err(|e| {
                    Error::record(serial, format!("column {i} is not valid {}: {e}", self.options.encoding))
                })
            })
            .collect()
    }
}

impl RecordSource for TabularSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&mut self) -> Result<u64> {
        let mut reader = self.open_reader()?;
        let mut row = csv::ByteRecord::new();
        let mut rows: u64 = 0;
        while self.read_raw(&mut reader, &mut row)? {
            rows += 1;
        }
        Ok(rows.saturating_sub(self.options.header_rows as u64))
    }

    fn seek_to(&mut self, records: u64) -> Result<()> {
        self.restart()?;
        let mut row = csv::ByteRecord::new();
        let Some(mut reader) = self.reader.take() else {
            return Ok(());
        };
        while self.serial < records && self.read_raw(&mut reader, &mut row)? {
            self.serial += 1;
        }
        self.reader = Some(reader);
        tracing::debug!(source = %self.name, skipped = self.serial, "Seeked tabular source");
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        if self.reader.is_none() {
            self.restart()?;
        }
        let Some(mut reader) = self.reader.take() else {
            return Ok(None);
        };
        let mut row = csv::ByteRecord::new();
        let more = self.read_raw(&mut reader, &mut row);
        self.reader = Some(reader);
        if !more? {
            return Ok(None);
        }

        self.serial += 1;
        let serial = self.serial;
        let length = row.as_slice().len() + row.len().saturating_sub(1);
        if self.options.max_line_length > 0 && length > self.options.max_line_length {
            return Err(Error::record(
                serial,
                format!(
                    "record is {length} bytes long, the limit is {}",
                    self.options.max_line_length
                ),
            ));
        }

        let text = self.raw_text(&row);
        let columns = self.decode_row(serial, &row)?;

        let required = self.options.required_columns;
        if required > 1 && columns.len() < required {
            return Err(match self.options.on_column_mismatch {
                ColumnMismatchPolicy::Fail => Error::ColumnCountMismatch {
                    record: serial,
                    expected: required,
                    found: columns.len(),
                },
                ColumnMismatchPolicy::Skip => Error::record(
                    serial,
                    format!(
                        "expected at least {required} columns, found {}",
                        columns.len()
                    ),
                ),
            });
        }

        Ok(Some(RawRecord {
            serial,
            text,
            body: RecordBody::Tabular {
                columns,
                headers: Arc::clone(&self.headers),
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(data: &str, options: TabularOptions) -> TabularSource {
        TabularSource::new(&Resource::from_bytes("test.csv", data), options)
    }

    fn columns(record: &RawRecord) -> Vec<String> {
        (0..record.column_count())
            .filter_map(|i| record.column(i))
            .collect()
    }

    #[test]
    fn test_reads_records_after_header() {
        let mut src = source("id,name\n1,Alice\n2,Bob\n", TabularOptions::default());
        assert_eq!(src.count().expect("count"), 2);

        let first = src.next_record().expect("read").expect("record");
        assert_eq!(first.serial, 1);
        assert_eq!(columns(&first), vec!["1", "Alice"]);
        assert_eq!(first.select("name"), Some("Alice".to_string()));
        assert_eq!(src.headers(), ["id".to_string(), "name".to_string()]);

        let second = src.next_record().expect("read").expect("record");
        assert_eq!(second.serial, 2);
        assert!(src.next_record().expect("read").is_none());
    }

    #[test]
    fn test_quoted_newlines_are_one_record() {
        let data = "id,text\n1,\"line one\nline two\"\n2,plain\n";
        let mut src = source(data, TabularOptions::default());
        assert_eq!(src.count().expect("count"), 2);
        let first = src.next_record().expect("read").expect("record");
        assert_eq!(first.column(1), Some("line one\nline two".to_string()));
    }

    #[test]
    fn test_seek_skips_records() {
        let mut src = source("h\na\nb\nc\n", TabularOptions::default());
        src.next_record().expect("read");
        src.seek_to(2).expect("seek");
        let record = src.next_record().expect("read").expect("record");
        assert_eq!(record.serial, 3);
        assert_eq!(record.column(0), Some("c".to_string()));
    }

    #[test]
    fn test_count_is_independent_of_position() {
        let mut src = source("h\na\nb\n", TabularOptions::default());
        src.next_record().expect("read");
        assert_eq!(src.count().expect("count"), 2);
        let record = src.next_record().expect("read").expect("record");
        assert_eq!(record.serial, 2);
    }

    #[test]
    fn test_tab_delimiter_and_no_header() {
        let options = TabularOptions {
            delimiter: b'\t',
            header_rows: 0,
            ..TabularOptions::default()
        };
        let mut src = source("a\tb\n", options);
        assert_eq!(src.count().expect("count"), 1);
        let record = src.next_record().expect("read").expect("record");
        assert_eq!(columns(&record), vec!["a", "b"]);
        assert_eq!(record.text, "a\tb");
    }

    #[test]
    fn test_column_guard_fail_is_fatal() {
        let options = TabularOptions {
            required_columns: 3,
            ..TabularOptions::default()
        };
        let mut src = source("a,b,c\n1,2,3\n4;5;6\n", options);
        assert!(src.next_record().expect("read").is_some());
        let err = src.next_record().expect_err("short record");
        assert!(matches!(
            err,
            Error::ColumnCountMismatch {
                record: 2,
                expected: 3,
                found: 1
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_column_guard_skip_continues() {
        let options = TabularOptions {
            required_columns: 2,
            on_column_mismatch: ColumnMismatchPolicy::Skip,
            ..TabularOptions::default()
        };
        let mut src = source("a,b\nshort\n1,2\n", options);
        let err = src.next_record().expect_err("short record");
        assert!(!err.is_fatal());
        let record = src.next_record().expect("read").expect("record");
        assert_eq!(record.serial, 2);
    }

    #[test]
    fn test_encoding_and_length_errors_are_record_errors() {
        let bytes: Vec<u8> = b"h\n\xff\xfe\nok\n".to_vec();
        let mut src = TabularSource::new(
            &Resource::from_bytes("bad.csv", bytes),
            TabularOptions::default(),
        );
        assert!(matches!(
            src.next_record(),
            Err(Error::Record { record: 1, .. })
        ));
        assert!(src.next_record().expect("read").is_some());

        let options = TabularOptions {
            max_line_length: 4,
            ..TabularOptions::default()
        };
        let mut src = source("h\ntoo long\nok\n", options);
        assert!(matches!(
            src.next_record(),
            Err(Error::Record { record: 1, .. })
        ));
        assert_eq!(
            src.next_record().expect("read").and_then(|r| r.column(0)),
            Some("ok".to_string())
        );
    }

    #[test]
    fn test_latin1_is_decoded() {
        let options = TabularOptions {
            encoding: Encoding::parse("latin1").expect("label"),
            header_rows: 0,
            ..TabularOptions::default()
        };
        let mut src = TabularSource::new(
            &Resource::from_bytes("l.csv", b"caf\xe9,\x80 5\n".to_vec()),
            options,
        );
        let record = src.next_record().expect("read").expect("record");
        assert_eq!(record.column(0), Some("café".to_string()));
        assert_eq!(record.column(1), Some("€ 5".to_string()));
    }
}
