//! Data-channel control messages
//!
//! Once two peers have an open channel they exchange JSON text frames, each
//! tagged by a `type` field:
//!
//! ```text
//! {"type":"message","content":"hi"}
//! {"type":"file-start","metadata":{"name":"a.txt","size":5,"mimeType":"text/plain"}}
//! {"type":"file-chunk","chunk":{"data":"aGVsbG8=","index":0,"total":1}}
//! {"type":"file-end"}
//! ```
//!
//! Chunk bytes are base64 so every frame stays valid JSON text.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Description of a file announced by `file-start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// Lowercase hex SHA-256 of the whole file, verified after reassembly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// One fragment of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    /// Base64 of the raw chunk bytes
    pub data: String,
    /// Zero-based position of this chunk
    pub index: u32,
    /// Number of chunks in the whole file
    pub total: u32,
}

impl FileChunk {
    /// Encode raw bytes as chunk `index` of `total`
    pub fn encode(index: u32, total: u32, bytes: &[u8]) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            index,
            total,
        }
    }

    /// Decode the raw bytes carried by this chunk
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

/// A control message on an open data channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChannelMessage {
    /// Plain text chat
    Message { content: String },
    /// Start of a file transfer
    FileStart { metadata: FileMetadata },
    /// One file fragment
    FileChunk { chunk: FileChunk },
    /// End of the current file transfer
    FileEnd,
}

impl ChannelMessage {
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Parse a frame received as raw bytes from the native channel
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_shape() {
        let msg = ChannelMessage::Message {
            content: "hello".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"type": "message", "content": "hello"}));
    }

    #[test]
    fn test_file_start_shape() {
        let msg = ChannelMessage::FileStart {
            metadata: FileMetadata {
                name: "notes.txt".into(),
                size: 42,
                mime_type: "text/plain".into(),
                sha256: None,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "file-start",
                "metadata": {"name": "notes.txt", "size": 42, "mimeType": "text/plain"}
            })
        );
    }

    #[test]
    fn test_file_start_accepts_hash() {
        let text = r#"{"type":"file-start","metadata":{"name":"a","size":0,"mimeType":"x/y","sha256":"ab"}}"#;
        let Ok(ChannelMessage::FileStart { metadata }) = ChannelMessage::from_text(text) else {
            panic!("expected file-start");
        };
        assert_eq!(metadata.sha256.as_deref(), Some("ab"));
    }

    #[test]
    fn test_file_chunk_shape() {
        let msg = ChannelMessage::FileChunk {
            chunk: FileChunk::encode(3, 7, b"hello"),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "file-chunk",
                "chunk": {"data": "aGVsbG8=", "index": 3, "total": 7}
            })
        );
    }

    #[test]
    fn test_file_end_shape() {
        let text = ChannelMessage::FileEnd.to_text().unwrap();
        assert_eq!(text, r#"{"type":"file-end"}"#);
        assert_eq!(
            ChannelMessage::from_bytes(text.as_bytes()).unwrap(),
            ChannelMessage::FileEnd
        );
    }

    #[test]
    fn test_chunk_decode() {
        let chunk = FileChunk::encode(0, 1, &[0, 255, 7]);
        assert_eq!(chunk.decode().unwrap(), vec![0, 255, 7]);

        let empty = FileChunk::encode(0, 1, &[]);
        assert_eq!(empty.data, "");
        assert!(empty.decode().unwrap().is_empty());
    }

    #[test]
    fn test_chunk_decode_rejects_garbage() {
        let chunk = FileChunk {
            data: "not base64!".into(),
            index: 0,
            total: 1,
        };
        assert!(chunk.decode().is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ChannelMessage::from_text(r#"{"type":"file-resume"}"#).is_err());
    }
}
