//! File transport: one reader/writer per edge.
//!
//! File channels are the simplest leg of the fabric - no multiplexing, no
//! address resolution. The scheduler guarantees a consumer stage never
//! starts before the producing group finished, so a reader always sees a
//! complete file.

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};

use super::ChannelError;
use crate::record::{Record, read_frame, write_frame};

/// Reads length-delimited records from a file.
pub struct FileRecordReader {
    path: PathBuf,
    reader: BufReader<File>,
}

impl FileRecordReader {
    /// Open the file at `path` for reading.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ChannelError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        Ok(Self {
            path,
            reader: BufReader::new(file),
        })
    }

    /// Read the next record; `None` at end of file.
    pub async fn read(&mut self) -> Result<Option<Record>, ChannelError> {
        Ok(read_frame(&mut self.reader).await?)
    }

    /// The path this reader was opened against.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Writes length-delimited records to a file, creating or truncating it.
pub struct FileRecordWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileRecordWriter {
    /// Create (or truncate) the file at `path` for writing.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, ChannelError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Append one record.
    pub async fn write(&mut self, record: &Record) -> Result<(), ChannelError> {
        match self.writer.as_mut() {
            Some(writer) => Ok(write_frame(writer, record).await?),
            None => Err(ChannelError::Disconnected {
                channel: self.path.display().to_string(),
            }),
        }
    }

    /// Flush and close the file. Repeated closes are no-ops.
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
        }
        Ok(())
    }

    /// The path this writer was opened against.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_then_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.dat");

        let mut writer = FileRecordWriter::create(&path).await.unwrap();
        for i in 0..3 {
            writer.write(&Record::new(json!(i))).await.unwrap();
        }
        writer.close().await.unwrap();

        let mut reader = FileRecordReader::open(&path).await.unwrap();
        for i in 0..3 {
            let record = reader.read().await.unwrap().unwrap();
            assert_eq!(record.payload, json!(i));
        }
        assert!(reader.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("closed.dat");

        let mut writer = FileRecordWriter::create(&path).await.unwrap();
        writer.close().await.unwrap();
        writer.close().await.unwrap();
        assert!(writer.write(&Record::text("late")).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            FileRecordReader::open(dir.path().join("absent.dat"))
                .await
                .is_err()
        );
    }
}
