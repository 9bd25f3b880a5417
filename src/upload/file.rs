//! Files entering the pipeline
//!
//! An [`UploadFile`] carries the metadata a browser would report for a
//! selected file (name, size, declared type) plus access to its content.
//! Content is read lazily: the validator only needs the first few bytes,
//! the transfer needs the whole body.

use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Where the content of an [`UploadFile`] lives
#[derive(Debug, Clone)]
pub enum FileSource {
    Memory(Bytes),
    Disk(PathBuf),
}

/// A file submitted for upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    name: String,
    size: u64,
    content_type: String,
    source: FileSource,
}

impl UploadFile {
    /// Create a file from in-memory content. The size is the content length.
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            content_type: content_type.into(),
            source: FileSource::Memory(data),
        }
    }

    /// Create a file backed by a path on disk.
    ///
    /// The name is the final path component and the size comes from the
    /// file's metadata. When `content_type` is `None` it is guessed from the
    /// extension, and left empty if the extension is unknown.
    pub async fn from_path(
        path: impl AsRef<Path>,
        content_type: Option<String>,
    ) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let content_type = content_type.unwrap_or_else(|| {
            mime_guess::from_path(path)
                .first()
                .map(|mime| mime.essence_str().to_string())
                .unwrap_or_default()
        });

        Ok(Self {
            name,
            size: metadata.len(),
            content_type,
            source: FileSource::Disk(path.to_path_buf()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Declared MIME type, possibly empty
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Read at most `len` bytes from the start of the content
    pub async fn read_header(&self, len: usize) -> io::Result<Bytes> {
        match &self.source {
            FileSource::Memory(data) => Ok(data.slice(..len.min(data.len()))),
            FileSource::Disk(path) => {
                let file = tokio::fs::File::open(path).await?;
                let mut buf = Vec::with_capacity(len);
                file.take(len as u64).read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Read the full content
    pub async fn read_body(&self) -> io::Result<Bytes> {
        match &self.source {
            FileSource::Memory(data) => Ok(data.clone()),
            FileSource::Disk(path) => tokio::fs::read(path).await.map(Bytes::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_memory_header_is_capped() {
        let file = UploadFile::from_bytes("a.bin", "", vec![7u8; 100]);
        assert_eq!(file.size(), 100);
        assert_eq!(file.read_header(32).await.unwrap().len(), 32);

        let small = UploadFile::from_bytes("b.bin", "", vec![1u8; 4]);
        assert_eq!(small.read_header(32).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_disk_file_metadata_and_guessed_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&[0x89, 0x50, 0x4E, 0x47, 1, 2, 3]).unwrap();

        let file = UploadFile::from_path(&path, None).await.unwrap();
        assert_eq!(file.name(), "photo.png");
        assert_eq!(file.size(), 7);
        assert_eq!(file.content_type(), "image/png");
        assert_eq!(&file.read_header(4).await.unwrap()[..], &[0x89, 0x50, 0x4E, 0x47]);
        assert_eq!(file.read_body().await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_unknown_extension_leaves_type_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.zzqq");
        std::fs::write(&path, b"x").unwrap();

        let file = UploadFile::from_path(&path, None).await.unwrap();
        assert_eq!(file.content_type(), "");
    }

    #[tokio::test]
    async fn test_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(UploadFile::from_path(dir.path(), None).await.is_err());
    }
}
