//! Instrumented source wrapper.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{RowSource, RowStream, SampleStream, SourceError};

/// Wraps a source and counts the rows pulled from it and the passes opened
/// over it. Counters are shared between clones.
#[derive(Debug, Clone)]
pub struct CountingSource {
    inner: Arc<dyn RowSource>,
    pulled: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl CountingSource {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn RowSource>) -> Self {
        Self {
            inner,
            pulled: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Rows pulled since creation or the last reset.
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    /// Passes opened since creation or the last reset.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Zeroes both counters.
    pub fn reset(&self) {
        self.pulled.store(0, Ordering::SeqCst);
        self.opened.store(0, Ordering::SeqCst);
    }
}

impl RowSource for CountingSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn columns(&self) -> Result<Vec<String>, SourceError> {
        self.inner.columns()
    }

    fn open(&self) -> Result<RowStream, SourceError> {
        let stream = self.inner.open()?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        let pulled = Arc::clone(&self.pulled);
        Ok(Box::new(stream.inspect(move |row| {
            if row.is_ok() {
                pulled.fetch_add(1, Ordering::SeqCst);
            }
        })))
    }

    fn open_sample(&self) -> Result<SampleStream, SourceError> {
        let stream = self.inner.open_sample()?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        let pulled = Arc::clone(&self.pulled);
        Ok(Box::new(stream.inspect(move |row| {
            if row.is_ok() {
                pulled.fetch_add(1, Ordering::SeqCst);
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CsvReadOptions, CsvSource, MemorySource};

    #[test]
    fn test_counts_pulled_rows() {
        let inner = MemorySource::from_strs("t", &["a"], &[&["1"], &["2"], &["3"]]);
        let source = CountingSource::new(Arc::new(inner));

        let mut stream = source.open().unwrap();
        stream.next();
        stream.next();
        assert_eq!(source.pulled(), 2);
        assert_eq!(source.opened(), 1);

        let clone = source.clone();
        assert_eq!(clone.open().unwrap().count(), 3);
        assert_eq!(source.pulled(), 5);

        source.reset();
        assert_eq!(source.pulled(), 0);
        assert_eq!(source.opened(), 0);
    }

    #[test]
    fn test_sampling_keeps_quote_flags() {
        let inner = CsvSource::from_bytes("t", &b"a\n\"x\"\ny\n"[..], CsvReadOptions::default());
        let source = CountingSource::new(Arc::new(inner));

        let flags: Vec<bool> = source
            .open_sample()
            .unwrap()
            .map(|row| row.unwrap().is_quoted(0))
            .collect();
        assert_eq!(flags, vec![true, false]);
        assert_eq!(source.pulled(), 2);
        assert_eq!(source.opened(), 1);
    }
}
