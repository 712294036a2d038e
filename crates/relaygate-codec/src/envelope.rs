//! The outer versioned envelope wrapper.
//!
//! V0 predates the version marker: it opens directly with a 4-byte
//! little-endian ciphertext length and carries no explicit device-id
//! length — the decoder takes whatever follows the ciphertext as the
//! device id. V1–V4 open with a 1-byte version marker, use a 2-byte
//! ciphertext length and a 1-byte device-id length, and close with a
//! 2-character language code.

use crate::content::ContentFormat;
use crate::reader::{write_len, FieldReader, Width};
use crate::CodecError;

/// Envelope payload version. Selects both the field layout and the
/// content format used inside the ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadVersion {
    V0,
    V1,
    V2,
    V3,
    V4,
}

impl PayloadVersion {
    /// Version marker byte, absent for V0.
    pub fn marker(self) -> Option<u8> {
        match self {
            PayloadVersion::V0 => None,
            PayloadVersion::V1 => Some(0x01),
            PayloadVersion::V2 => Some(0x02),
            PayloadVersion::V3 => Some(0x03),
            PayloadVersion::V4 => Some(0x04),
        }
    }

    /// Look a marker byte up in the dispatch table.
    pub fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(PayloadVersion::V1),
            0x02 => Some(PayloadVersion::V2),
            0x03 => Some(PayloadVersion::V3),
            0x04 => Some(PayloadVersion::V4),
            _ => None,
        }
    }

    /// The content format a payload version carries. Fixed by this table,
    /// never independently chosen.
    pub fn content_format(self) -> ContentFormat {
        match self {
            PayloadVersion::V0 => ContentFormat::V0,
            PayloadVersion::V1 => ContentFormat::V1,
            PayloadVersion::V2 => ContentFormat::V2,
            PayloadVersion::V3 => ContentFormat::V3,
            PayloadVersion::V4 => ContentFormat::V4,
        }
    }
}

/// Field layout for one payload version.
struct EnvelopeLayout {
    ciphertext_len: Width,
    device_id_len: Option<Width>,
    has_language: bool,
}

/// Dispatch table: adding a version means adding a row here, not new
/// parsing code.
fn layout(version: PayloadVersion) -> EnvelopeLayout {
    match version {
        PayloadVersion::V0 => EnvelopeLayout {
            ciphertext_len: Width::Four,
            device_id_len: None,
            has_language: false,
        },
        PayloadVersion::V1 | PayloadVersion::V2 | PayloadVersion::V3 | PayloadVersion::V4 => {
            EnvelopeLayout {
                ciphertext_len: Width::Two,
                device_id_len: Some(Width::One),
                has_language: true,
            }
        }
    }
}

/// The decoded outer wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: PayloadVersion,
    /// Single byte identifying the target platform.
    pub platform_shortcode: u8,
    /// Opaque ciphertext; decryption happens elsewhere.
    pub ciphertext: Vec<u8>,
    /// Device identifier, may be empty.
    pub device_id: Vec<u8>,
    /// 2-character language code, absent in V0.
    pub language: Option<String>,
}

/// Knobs for the historically ambiguous corners of the format.
#[derive(Debug, Clone, Default)]
pub struct CodecOptions {
    /// When set, V0 envelopes carry a fixed-length device id instead of
    /// "everything after the ciphertext". Source revisions disagree on
    /// which is correct, so it is a constant here rather than an
    /// inference.
    pub v0_device_id_len: Option<usize>,
}

/// Decode an envelope with default options.
pub fn decode_envelope(payload: &[u8]) -> Result<Envelope, CodecError> {
    decode_envelope_with(payload, &CodecOptions::default())
}

/// Decode an envelope.
///
/// V0 is recognized structurally (no marker byte): the buffer must hold at
/// least the 5-byte header and enough bytes for the declared ciphertext.
/// Anything else is dispatched through the version marker.
pub fn decode_envelope_with(
    payload: &[u8],
    options: &CodecOptions,
) -> Result<Envelope, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::MalformedEnvelope("empty payload".into()));
    }

    if is_v0_payload(payload) {
        return decode_v0(payload, options);
    }

    let mut reader = FieldReader::new(payload);
    let marker = reader
        .read_u8()
        .map_err(|_| CodecError::MalformedEnvelope("empty payload".into()))?;
    let version = PayloadVersion::from_marker(marker)
        .ok_or(CodecError::UnsupportedVersion(marker))?;
    let spec = layout(version);

    let ciphertext_len = reader
        .read_len(spec.ciphertext_len)
        .map_err(|_| CodecError::MalformedEnvelope("truncated ciphertext length".into()))?;
    let device_id_len = match spec.device_id_len {
        Some(width) => reader
            .read_len(width)
            .map_err(|_| CodecError::MalformedEnvelope("truncated device-id length".into()))?,
        None => 0,
    };
    let platform_shortcode = reader
        .read_u8()
        .map_err(|_| CodecError::MalformedEnvelope("missing platform shortcode".into()))?;

    let ciphertext = reader.take(ciphertext_len).map_err(|_| {
        CodecError::LengthMismatch(format!(
            "declared ciphertext length {ciphertext_len} exceeds remaining buffer"
        ))
    })?;
    let device_id = reader.take(device_id_len).map_err(|_| {
        CodecError::LengthMismatch(format!(
            "declared device-id length {device_id_len} exceeds remaining buffer"
        ))
    })?;

    let language = if spec.has_language {
        let raw = reader
            .take(2)
            .map_err(|_| CodecError::MalformedEnvelope("truncated language code".into()))?;
        Some(String::from_utf8_lossy(raw).into_owned())
    } else {
        None
    };

    if !reader.is_empty() {
        return Err(CodecError::LengthMismatch(format!(
            "{} trailing byte(s) after envelope",
            reader.remaining()
        )));
    }

    Ok(Envelope {
        version,
        platform_shortcode,
        ciphertext: ciphertext.to_vec(),
        device_id: device_id.to_vec(),
        language,
    })
}

/// Decode the marker-less V0 layout.
fn decode_v0(payload: &[u8], options: &CodecOptions) -> Result<Envelope, CodecError> {
    let mut reader = FieldReader::new(payload);
    let ciphertext_len = reader
        .read_len(Width::Four)
        .map_err(|_| CodecError::MalformedEnvelope("truncated ciphertext length".into()))?;
    let platform_shortcode = reader
        .read_u8()
        .map_err(|_| CodecError::MalformedEnvelope("missing platform shortcode".into()))?;
    let ciphertext = reader.take(ciphertext_len).map_err(|_| {
        CodecError::LengthMismatch(format!(
            "declared ciphertext length {ciphertext_len} exceeds remaining buffer"
        ))
    })?;

    let device_id = match options.v0_device_id_len {
        Some(len) => {
            let raw = reader.take(len).map_err(|_| {
                CodecError::LengthMismatch(format!(
                    "configured V0 device-id length {len} exceeds remaining buffer"
                ))
            })?;
            if !reader.is_empty() {
                return Err(CodecError::LengthMismatch(format!(
                    "{} trailing byte(s) after V0 device id",
                    reader.remaining()
                )));
            }
            raw
        }
        // No explicit length in V0: the rest of the buffer is the device id.
        None => reader.take_rest(),
    };

    Ok(Envelope {
        version: PayloadVersion::V0,
        platform_shortcode,
        ciphertext: ciphertext.to_vec(),
        device_id: device_id.to_vec(),
        language: None,
    })
}

/// Structural check for the marker-less V0 layout: at least a 4-byte
/// length plus shortcode, a non-negative signed length, and enough bytes
/// for the declared ciphertext.
pub fn is_v0_payload(payload: &[u8]) -> bool {
    if payload.len() < 5 {
        return false;
    }
    let declared = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    if declared < 0 {
        return false;
    }
    payload.len() >= 5 + declared as usize
}

/// Encode an envelope back to its wire form. Inverse of
/// [`decode_envelope`], used for round-trip tests and probe generation.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let spec = layout(envelope.version);
    let mut out = Vec::new();

    if let Some(marker) = envelope.version.marker() {
        out.push(marker);
    }
    if !write_len(&mut out, spec.ciphertext_len, envelope.ciphertext.len()) {
        return Err(CodecError::LengthMismatch(format!(
            "ciphertext length {} does not fit the {:?} prefix",
            envelope.ciphertext.len(),
            spec.ciphertext_len
        )));
    }
    if let Some(width) = spec.device_id_len {
        if !write_len(&mut out, width, envelope.device_id.len()) {
            return Err(CodecError::LengthMismatch(format!(
                "device-id length {} does not fit the {:?} prefix",
                envelope.device_id.len(),
                width
            )));
        }
    }
    out.push(envelope.platform_shortcode);
    out.extend_from_slice(&envelope.ciphertext);
    out.extend_from_slice(&envelope.device_id);

    if spec.has_language {
        let language = envelope.language.as_deref().unwrap_or("en");
        if language.len() != 2 {
            return Err(CodecError::MalformedEnvelope(format!(
                "language code '{language}' is not 2 bytes"
            )));
        }
        out.extend_from_slice(language.as_bytes());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(version: PayloadVersion) -> Envelope {
        Envelope {
            version,
            platform_shortcode: b't',
            ciphertext: vec![0xde, 0xad, 0xbe, 0xef],
            device_id: vec![0x11, 0x22],
            language: version.marker().map(|_| "en".to_string()),
        }
    }

    #[test]
    fn roundtrip_all_versions() {
        for version in [
            PayloadVersion::V0,
            PayloadVersion::V1,
            PayloadVersion::V2,
            PayloadVersion::V3,
            PayloadVersion::V4,
        ] {
            let envelope = sample(version);
            let bytes = encode_envelope(&envelope).unwrap();
            let decoded = decode_envelope(&bytes).unwrap();
            assert_eq!(decoded, envelope, "version {version:?}");
        }
    }

    #[test]
    fn v0_is_detected_without_marker() {
        let bytes = encode_envelope(&sample(PayloadVersion::V0)).unwrap();
        assert!(is_v0_payload(&bytes));
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded.version, PayloadVersion::V0);
        assert_eq!(decoded.language, None);
    }

    #[test]
    fn v0_device_id_is_buffer_remainder() {
        // 1-byte ciphertext, then three device-id bytes with no length.
        let mut bytes = vec![1, 0, 0, 0, b'g'];
        bytes.push(0xaa);
        bytes.extend_from_slice(&[1, 2, 3]);
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded.ciphertext, vec![0xaa]);
        assert_eq!(decoded.device_id, vec![1, 2, 3]);
    }

    #[test]
    fn v0_explicit_device_id_option() {
        let mut bytes = vec![1, 0, 0, 0, b'g', 0xaa];
        bytes.extend_from_slice(&[1, 2, 3]);
        let options = CodecOptions {
            v0_device_id_len: Some(3),
        };
        let decoded = decode_envelope_with(&bytes, &options).unwrap();
        assert_eq!(decoded.device_id, vec![1, 2, 3]);

        let short = CodecOptions {
            v0_device_id_len: Some(7),
        };
        assert!(matches!(
            decode_envelope_with(&bytes, &short),
            Err(CodecError::LengthMismatch(_))
        ));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let bytes = [0x09, 0, 0, 0, b'x'];
        assert!(matches!(
            decode_envelope(&bytes),
            Err(CodecError::UnsupportedVersion(0x09))
        ));
    }

    #[test]
    fn declared_ciphertext_longer_than_buffer() {
        // V1 header claiming 100 ciphertext bytes with only 2 present.
        let mut bytes = vec![0x01];
        bytes.extend_from_slice(&100u16.to_le_bytes());
        bytes.push(0); // device-id length
        bytes.push(b't');
        bytes.extend_from_slice(&[1, 2]);
        assert!(matches!(
            decode_envelope(&bytes),
            Err(CodecError::LengthMismatch(_))
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode_envelope(&sample(PayloadVersion::V2)).unwrap();
        bytes.push(0xff);
        assert!(matches!(
            decode_envelope(&bytes),
            Err(CodecError::LengthMismatch(_))
        ));
    }

    #[test]
    fn truncated_header_is_malformed() {
        assert!(matches!(
            decode_envelope(&[0x01, 0x05]),
            Err(CodecError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            decode_envelope(&[]),
            Err(CodecError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn version_content_format_table() {
        use crate::content::ContentFormat;
        assert_eq!(PayloadVersion::V0.content_format(), ContentFormat::V0);
        assert_eq!(PayloadVersion::V3.content_format(), ContentFormat::V3);
        assert_eq!(PayloadVersion::V4.content_format(), ContentFormat::V4);
    }
}
