//! Random-access byte sources read one window at a time.

use std::io::SeekFrom;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncSeekExt;

use crate::error::Error;
use crate::error::Result;

/// Input to the chunked hasher. The length must be known up front.
#[async_trait]
pub trait ChunkSource: Send {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads exactly `len` bytes starting at `offset`.
    async fn read_window(&mut self, offset: u64, len: usize) -> Result<Vec<u8>>;
}

/// A file on disk, read with positioned reads.
pub struct FileSource {
    file: File,
    path: PathBuf,
    len: u64,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| Error::FileRead(format!("{}: {}", path.display(), e)))?;
        let len = file.metadata().await?.len();
        Ok(Self { file, path, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file name, used to name the signature file.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_window(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf).await.map_err(|e| {
            Error::FileRead(format!("{} at offset {}: {}", self.path.display(), offset, e))
        })?;
        Ok(buf)
    }
}

/// An in-memory buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_window(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let start = usize::try_from(offset).map_err(|_| Error::FileRead(format!("offset {} out of range", offset)))?;
        let end = start.checked_add(len).filter(|&end| end <= self.data.len()).ok_or_else(|| {
            Error::FileRead(format!("window {}..{} past end of {} bytes", offset, offset + len as u64, self.data.len()))
        })?;
        Ok(self.data[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_windows() {
        let mut source = MemorySource::new(b"0123456789".to_vec());
        assert_eq!(source.len(), 10);
        assert_eq!(source.read_window(0, 4).await.unwrap(), b"0123");
        assert_eq!(source.read_window(8, 2).await.unwrap(), b"89");
        assert!(matches!(source.read_window(8, 3).await, Err(Error::FileRead(_))));
    }

    #[tokio::test]
    async fn test_file_windows() {
        let path = std::env::temp_dir().join(format!("cadesign-source-{}.bin", std::process::id()));
        tokio::fs::write(&path, b"abcdefgh").await.unwrap();

        let mut source = FileSource::open(&path).await.unwrap();
        assert_eq!(source.len(), 8);
        assert_eq!(source.read_window(6, 2).await.unwrap(), b"gh");
        assert_eq!(source.read_window(0, 3).await.unwrap(), b"abc");

        // The file shrinking under us is a read error, not a short window.
        tokio::fs::write(&path, b"abc").await.unwrap();
        assert!(matches!(source.read_window(4, 4).await, Err(Error::FileRead(_))));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = FileSource::open("/nonexistent/cadesign/input.pdf").await;
        assert!(matches!(result, Err(Error::FileRead(_))));
    }
}
