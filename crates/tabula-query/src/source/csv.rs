//! CSV row source backed by the `csv` crate.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{dedup_names, RawRow, RowSource, RowStream, SampleRow, SampleStream, SourceError};

/// Dialect and error handling for CSV input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvReadOptions {
    /// Field delimiter.
    pub delimiter: u8,
    /// Quote character.
    pub quote: u8,
    /// The first record holds column names. Without a header, columns are
    /// named `column_1`, `column_2`, ...
    pub has_header: bool,
    /// Malformed records are skipped and undecodable cells become null.
    pub ignore_errors: bool,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            has_header: true,
            ignore_errors: false,
        }
    }
}

#[derive(Debug, Clone)]
enum CsvInput {
    File(PathBuf),
    Bytes(Arc<[u8]>),
}

/// A CSV file or in-memory CSV buffer.
#[derive(Debug, Clone)]
pub struct CsvSource {
    name: String,
    input: CsvInput,
    options: CsvReadOptions,
}

impl CsvSource {
    /// Reads from a file. The source is named after the file stem.
    pub fn from_path(path: impl AsRef<Path>, options: CsvReadOptions) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            input: CsvInput::File(path),
            options,
        }
    }

    /// Reads from an in-memory buffer.
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        options: CsvReadOptions,
    ) -> Self {
        Self {
            name: name.into(),
            input: CsvInput::Bytes(bytes.into()),
            options,
        }
    }

    /// Returns the read options.
    pub fn options(&self) -> &CsvReadOptions {
        &self.options
    }

    fn input(&self) -> Result<Box<dyn Read + Send>, SourceError> {
        let input: Box<dyn Read + Send> = match &self.input {
            CsvInput::File(path) => Box::new(File::open(path).map_err(|source| SourceError::Io {
                path: path.display().to_string(),
                source,
            })?),
            CsvInput::Bytes(bytes) => Box::new(Cursor::new(Arc::clone(bytes))),
        };
        Ok(input)
    }

    fn reader(&self, input: Box<dyn Read + Send>) -> ::csv::Reader<Box<dyn Read + Send>> {
        ::csv::ReaderBuilder::new()
            .delimiter(self.options.delimiter)
            .quote(self.options.quote)
            .has_headers(self.options.has_header)
            .flexible(true)
            .from_reader(input)
    }
}

fn csv_error(name: &str, err: ::csv::Error) -> SourceError {
    match err.into_kind() {
        ::csv::ErrorKind::Io(source) => SourceError::Io {
            path: name.to_string(),
            source,
        },
        kind => SourceError::Csv {
            name: name.to_string(),
            message: format!("{:?}", kind),
        },
    }
}

/// Bytes read so far that belong to records not yet inspected. `base` is
/// the stream offset of `bytes[0]`.
#[derive(Debug, Default)]
struct SeenBytes {
    base: u64,
    bytes: Vec<u8>,
}

impl SeenBytes {
    /// Drops everything before stream offset `start` and returns the rest.
    fn since(&mut self, start: u64) -> &[u8] {
        let skip = usize::try_from(start.saturating_sub(self.base))
            .unwrap_or(usize::MAX)
            .min(self.bytes.len());
        self.bytes.drain(..skip);
        self.base += skip as u64;
        &self.bytes
    }
}

/// Copies everything the CSV reader consumes into a shared buffer.
struct TeeReader {
    inner: Box<dyn Read + Send>,
    seen: Arc<Mutex<SeenBytes>>,
}

impl Read for TeeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.seen.lock().bytes.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// Flags the quoted fields of the record starting at `bytes[0]`.
fn quote_flags(bytes: &[u8], fields: usize, delimiter: u8, quote: u8) -> Vec<bool> {
    let mut i = bytes
        .iter()
        .position(|&b| b != b'\n' && b != b'\r')
        .unwrap_or(bytes.len());
    let mut flags = Vec::with_capacity(fields);
    while flags.len() < fields {
        let quoted = bytes.get(i) == Some(&quote);
        flags.push(quoted);
        if quoted {
            i += 1;
            while i < bytes.len() {
                if bytes[i] == quote {
                    // A doubled quote is an escaped quote.
                    if bytes.get(i + 1) == Some(&quote) {
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
        }
        while i < bytes.len() && !matches!(bytes[i], b'\n' | b'\r') && bytes[i] != delimiter {
            i += 1;
        }
        i += 1;
    }
    flags
}

impl RowSource for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Result<Vec<String>, SourceError> {
        let mut reader = self.reader(self.input()?);
        if self.options.has_header {
            let headers = reader.headers().map_err(|e| csv_error(&self.name, e))?;
            return Ok(dedup_names(headers.iter().map(|h| h.trim().to_string()).collect()));
        }
        let width = match reader.records().next() {
            Some(record) => record.map_err(|e| csv_error(&self.name, e))?.len(),
            None => 0,
        };
        Ok((1..=width).map(|i| format!("column_{}", i)).collect())
    }

    fn open(&self) -> Result<RowStream, SourceError> {
        let reader = self.reader(self.input()?);
        let name = self.name.clone();
        let ignore_errors = self.options.ignore_errors;
        let rows = reader
            .into_records()
            .filter_map(move |record| match record {
                Ok(record) => Some(Ok(record.iter().map(|c| Some(c.to_string())).collect::<RawRow>())),
                Err(e) if ignore_errors && !e.is_io_error() => None,
                Err(e) => Some(Err(csv_error(&name, e))),
            });
        Ok(Box::new(rows))
    }

    fn open_sample(&self) -> Result<SampleStream, SourceError> {
        let seen = Arc::new(Mutex::new(SeenBytes::default()));
        let reader = self.reader(Box::new(TeeReader {
            inner: self.input()?,
            seen: Arc::clone(&seen),
        }));
        let name = self.name.clone();
        let CsvReadOptions {
            delimiter,
            quote,
            ignore_errors,
            ..
        } = self.options;
        let rows = reader
            .into_records()
            .filter_map(move |record| match record {
                Ok(record) => {
                    let start = record.position().map_or(0, |p| p.byte());
                    let quoted = quote_flags(seen.lock().since(start), record.len(), delimiter, quote);
                    let cells = record.iter().map(|c| Some(c.to_string())).collect();
                    Some(Ok(SampleRow { cells, quoted }))
                }
                Err(e) if ignore_errors && !e.is_io_error() => None,
                Err(e) => Some(Err(csv_error(&name, e))),
            });
        Ok(Box::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::parser::DataType;

    const SALES: &str = "year,town,value\n2020,A,100\n2020,B,200\n2019,A,50\n";

    #[test]
    fn test_in_memory_csv() {
        let source = CsvSource::from_bytes("sales", SALES.as_bytes(), CsvReadOptions::default());
        assert_eq!(source.columns().unwrap(), vec!["year", "town", "value"]);

        let rows: Vec<RawRow> = source.open().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][1].as_deref(), Some("A"));

        // Each open starts over.
        assert_eq!(source.open().unwrap().count(), 3);
    }

    #[test]
    fn test_csv_file_and_inference() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SALES.as_bytes()).unwrap();
        let source = CsvSource::from_path(file.path(), CsvReadOptions::default());

        let schema = source.schema_hint(100).unwrap();
        assert_eq!(schema.names(), vec!["year", "town", "value"]);
        assert_eq!(schema.fields()[0].data_type, DataType::Int64);
        assert_eq!(schema.fields()[1].data_type, DataType::Utf8);
    }

    #[test]
    fn test_headerless_and_delimiter() {
        let options = CsvReadOptions {
            delimiter: b';',
            has_header: false,
            ..CsvReadOptions::default()
        };
        let source = CsvSource::from_bytes("t", &b"1;x\n2;y\n"[..], options);
        assert_eq!(source.columns().unwrap(), vec!["column_1", "column_2"]);
        assert_eq!(source.open().unwrap().count(), 2);
    }

    #[test]
    fn test_ragged_rows_pass_through() {
        let source = CsvSource::from_bytes("t", &b"a,b\n1\n1,2,3\n"[..], CsvReadOptions::default());
        let rows: Vec<RawRow> = source.open().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[1].len(), 3);
    }

    #[test]
    fn test_sample_flags_quoted_cells() {
        let text = "a,b,c\n\"x, \"\"y\"\"\",2,\"\"\n\r\n4,\"5\",6\n";
        let source = CsvSource::from_bytes("t", text.as_bytes(), CsvReadOptions::default());
        let rows: Vec<SampleRow> = source.open_sample().unwrap().map(|r| r.unwrap()).collect();

        assert_eq!(rows[0].cells[0].as_deref(), Some("x, \"y\""));
        assert_eq!(rows[0].quoted, vec![true, false, true]);
        assert_eq!(rows[1].quoted, vec![false, true, false]);
    }

    #[test]
    fn test_quote_flags_respect_the_dialect() {
        assert_eq!(quote_flags(b"'a;b';c\n", 2, b';', b'\''), vec![true, false]);
        assert_eq!(quote_flags(b"\r\n x,\"y\"", 2, b',', b'"'), vec![false, true]);
    }

    #[test]
    fn test_missing_file() {
        let source = CsvSource::from_path("/nonexistent/file.csv", CsvReadOptions::default());
        assert!(matches!(source.open(), Err(SourceError::Io { .. })));
    }
}
