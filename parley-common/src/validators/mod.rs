//! Input validation functions
//!
//! Reusable validators shared between the relay and peers. Peers use them to
//! check what arrives over a data channel, the relay uses them to decide
//! whether a presented identity may be reused.

mod file_name;
mod message;
mod peer_id;
mod sha256;

pub use file_name::{FileNameError, MAX_FILE_NAME_LENGTH, validate_file_name};
pub use message::{MAX_MESSAGE_LENGTH, MessageError, validate_message};
pub use peer_id::{MAX_PEER_ID_LENGTH, PeerIdError, validate_peer_id};
pub use sha256::{SHA256_HEX_LENGTH, Sha256Error, validate_sha256};
