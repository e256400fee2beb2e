//! Files queued for sending

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncRead;

use parley_common::DEFAULT_MIME_TYPE;
use parley_common::channel::FileMetadata;
use parley_common::hash::{compute_sha256, sha256_hex};

use super::TransferError;

#[derive(Debug, Clone)]
enum FileSource {
    Memory(Vec<u8>),
    Disk(PathBuf),
}

/// A file ready to be streamed to a peer
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    name: String,
    mime_type: String,
    size: u64,
    sha256: String,
    source: FileSource,
}

impl OutgoingFile {
    /// Send an in-memory buffer
    ///
    /// An empty `mime_type` is sniffed from the content.
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        let mut mime_type = mime_type.into();
        if mime_type.is_empty() {
            mime_type = sniff_mime(infer::get(&data));
        }

        Self {
            name: name.into(),
            mime_type,
            size: data.len() as u64,
            sha256: sha256_hex(&data),
            source: FileSource::Memory(data),
        }
    }

    /// Send a file from disk
    ///
    /// The MIME type is detected from magic bytes and the content hash is
    /// computed up front. The file is streamed, never fully buffered.
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(TransferError::Io(format!("{} is not a file", path.display())));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))?
            .to_string();

        Ok(Self {
            name,
            mime_type: sniff_mime(infer::get_from_path(path).ok().flatten()),
            size: metadata.len(),
            sha256: compute_sha256(path).await?,
            source: FileSource::Disk(path.to_path_buf()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Lowercase hex SHA-256 of the content
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Metadata announced in `file-start`
    pub fn metadata(&self, include_hash: bool) -> FileMetadata {
        FileMetadata {
            name: self.name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            sha256: include_hash.then(|| self.sha256.clone()),
        }
    }

    /// Open a fresh reader positioned at the start of the content
    pub(crate) async fn reader(&self) -> io::Result<Box<dyn AsyncRead + Send + Unpin + '_>> {
        match &self.source {
            FileSource::Memory(data) => Ok(Box::new(data.as_slice())),
            FileSource::Disk(path) => Ok(Box::new(tokio::fs::File::open(path).await?)),
        }
    }
}

fn sniff_mime(kind: Option<infer::Type>) -> String {
    kind.map(|k| k.mime_type().to_string())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}
