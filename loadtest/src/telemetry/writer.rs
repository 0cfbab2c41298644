//! Batched, append-only CSV writer and the queue consumer that drives it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::entry::CsvRow;
use crate::errors::Result;

/// Appends batches of rows to one CSV file.
///
/// The file is opened in append mode for every batch and created if absent,
/// so a human tailing it sees each batch as soon as it is flushed.
#[derive(Debug, Clone)]
pub struct CsvBatchWriter {
    path: PathBuf,
}

impl CsvBatchWriter {
    /// Creates a writer for the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the target path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encodes rows into CSV bytes.
    pub fn encode(rows: &[Vec<String>]) -> Result<Vec<u8>> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for row in rows {
            wtr.write_record(row)?;
        }
        wtr.into_inner()
            .map_err(|e| crate::errors::HarnessError::Io(e.into_error()))
    }

    /// Creates the file if it does not exist yet, without truncating it.
    pub async fn touch(&self) -> Result<()> {
        self.open().await?;
        Ok(())
    }

    /// Appends one batch and flushes it.
    pub async fn append(&self, rows: &[Vec<String>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let bytes = Self::encode(rows)?;
        let mut file = self.open().await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }

    async fn open(&self) -> Result<tokio::fs::File> {
        let mut options = tokio::fs::OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        options.mode(0o600);
        Ok(options.open(&self.path).await?)
    }
}

/// Row counters for one consumer.
#[derive(Debug, Default)]
pub struct WriterStats {
    written: AtomicU64,
    lost: AtomicU64,
    failed_batches: AtomicU64,
}

impl WriterStats {
    /// Rows successfully appended.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Rows discarded because their batch failed to write.
    #[must_use]
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Batches that failed to write.
    #[must_use]
    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }
}

async fn flush_batch(writer: &CsvBatchWriter, batch: &mut Vec<Vec<String>>, stats: &WriterStats) {
    let rows = batch.len() as u64;
    match writer.append(batch).await {
        Ok(()) => {
            stats.written.fetch_add(rows, Ordering::Relaxed);
        }
        Err(e) => {
            stats.lost.fetch_add(rows, Ordering::Relaxed);
            stats.failed_batches.fetch_add(1, Ordering::Relaxed);
            error!(
                path = %writer.path().display(),
                rows = rows,
                error = %e,
                "Error writing to CSV file"
            );
        }
    }
    batch.clear();
}

/// Drains a queue into a CSV file until every sender is gone.
///
/// Rows are buffered until `batch_size` of them accumulate; a trailing
/// partial batch is flushed when the queue closes.
pub async fn consume<E: CsvRow>(
    kind: &'static str,
    mut rx: mpsc::Receiver<E>,
    writer: CsvBatchWriter,
    batch_size: usize,
    stats: Arc<WriterStats>,
) {
    let batch_size = batch_size.max(1);
    let mut batch: Vec<Vec<String>> = Vec::with_capacity(batch_size);
    let mut processed: u64 = 0;

    while let Some(entry) = rx.recv().await {
        batch.push(entry.to_record());
        processed += 1;
        if batch.len() >= batch_size {
            flush_batch(&writer, &mut batch, &stats).await;
        }
    }

    if !batch.is_empty() {
        flush_batch(&writer, &mut batch, &stats).await;
    }

    debug!(
        kind = kind,
        processed = processed,
        written = stats.written(),
        lost = stats.lost(),
        "Telemetry writer finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::entry::ErrorEntry;

    #[test]
    fn test_encode_quotes_fields() {
        let rows = vec![vec!["a".to_string(), "b, c".to_string(), "say \"hi\"".to_string()]];
        let bytes = CsvBatchWriter::encode(&rows).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "a,\"b, c\",\"say \"\"hi\"\"\"\n");
    }

    #[tokio::test]
    async fn test_append_does_not_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CsvBatchWriter::new(dir.path().join("out.csv"));

        writer.append(&[vec!["1".into()]]).await.unwrap();
        writer.touch().await.unwrap();
        writer.append(&[vec!["2".into()], vec!["3".into()]]).await.unwrap();

        let contents = std::fs::read_to_string(writer.path()).unwrap();
        assert_eq!(contents, "1\n2\n3\n");
    }

    #[tokio::test]
    async fn test_consume_flushes_partial_batch() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CsvBatchWriter::new(dir.path().join("errors.csv"));
        let stats = Arc::new(WriterStats::default());
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(consume("errors", rx, writer.clone(), 3, stats.clone()));
        for code in 0..4u16 {
            tx.send(ErrorEntry::new(code, "boom")).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        let contents = std::fs::read_to_string(writer.path()).unwrap();
        assert_eq!(contents.lines().count(), 4);
        assert_eq!(stats.written(), 4);
        assert_eq!(stats.lost(), 0);
    }

    #[tokio::test]
    async fn test_consume_counts_lost_rows_on_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a file for appending.
        let writer = CsvBatchWriter::new(dir.path().to_path_buf());
        let stats = Arc::new(WriterStats::default());
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(consume("errors", rx, writer, 2, stats.clone()));
        for code in 0..3u16 {
            tx.send(ErrorEntry::new(code, "boom")).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(stats.written(), 0);
        assert_eq!(stats.lost(), 3);
        assert_eq!(stats.failed_batches(), 2);
    }
}
