//! RelayGate wire codec — versioned envelope and content formats.
//!
//! The codec turns the raw bytes carried over SMS (or any other
//! narrow-bandwidth channel) into typed values and back:
//!
//! - **Envelope**: the outer versioned wrapper holding the ciphertext,
//!   device id, platform shortcode and language code.
//! - **Content**: the inner layout decrypted from the ciphertext — an
//!   email, a text post, a chat message or a reliability-test probe.
//!
//! Decoding is a pure function of the payload version: a dispatch table
//! maps each version to a field layout and a content format, and a single
//! width-parameterized reader serves every version. The codec performs no
//! I/O and keeps no state, so it is safe to fuzz directly.

pub mod content;
pub mod envelope;
mod reader;

pub use content::{
    decode_content, encode_content, ContentFormat, ContentRecord, EmailContent, MessageContent,
    ServiceKind, TestContent, TextContent,
};
pub use envelope::{
    decode_envelope, decode_envelope_with, encode_envelope, CodecOptions, Envelope, PayloadVersion,
};

use thiserror::Error;

/// Errors from envelope and content decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The buffer is shorter than the minimum the version's layout requires.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The version byte is not in the dispatch table.
    #[error("unsupported payload version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// A declared length disagrees with the bytes actually present.
    #[error("length mismatch: {0}")]
    LengthMismatch(String),

    /// The decrypted content does not match the expected shape.
    #[error("malformed content: {0}")]
    MalformedContent(String),
}
