//! Content formats V0–V4 — the inner layout decrypted from the ciphertext.
//!
//! V0 is delimiter-separated text. V1 and V2 are length-prefixed binary
//! with a fixed eight-field block: inapplicable fields carry zero-filled
//! length prefixes (token prefixes are 1 byte in V1, 2 bytes in V2). V3
//! drops inapplicable fields entirely, so each variant has its own field
//! list. V4 prepends a content-type bitmap (bit0 = text, bit1 = image);
//! sections the bitmap gates off carry no length prefix at all.
//!
//! Every layout is described as a field table consumed by one
//! width-parameterized reader, so adding a format means adding table rows.

use crate::reader::{write_len, FieldReader, Width};
use crate::CodecError;
use serde::{Deserialize, Serialize};

/// Content format version. Tied to the payload version by the envelope
/// dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    V0,
    V1,
    V2,
    V3,
    V4,
}

/// The four semantic shapes a platform can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Email,
    Text,
    Message,
    Test,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Text => write!(f, "text"),
            Self::Message => write!(f, "message"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// An email to deliver: `from, to, cc, bcc, subject, body`, optional
/// token override and optional V4 image attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailContent {
    pub from: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub subject: String,
    pub body: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub image: Option<Vec<u8>>,
}

/// A public post: `sender, text`, optional tokens, optional V4 image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextContent {
    pub sender: String,
    pub text: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub image: Option<Vec<u8>>,
}

/// A direct chat message: `sender, receiver, message`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContent {
    pub sender: String,
    pub receiver: String,
    pub message: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// A reliability-test probe carrying only its test id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestContent {
    pub test_id: String,
}

/// Decoded content, tagged by semantic shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRecord {
    Email(EmailContent),
    Text(TextContent),
    Message(MessageContent),
    Test(TestContent),
}

impl ContentRecord {
    pub fn service_kind(&self) -> ServiceKind {
        match self {
            Self::Email(_) => ServiceKind::Email,
            Self::Text(_) => ServiceKind::Text,
            Self::Message(_) => ServiceKind::Message,
            Self::Test(_) => ServiceKind::Test,
        }
    }

    /// The account the content publishes from (first field of every
    /// shape), used as the vault lookup key.
    pub fn account_identifier(&self) -> &str {
        match self {
            Self::Email(e) => &e.from,
            Self::Text(t) => &t.sender,
            Self::Message(m) => &m.sender,
            Self::Test(t) => &t.test_id,
        }
    }

    /// Token override carried inside the content, if any.
    pub fn token_override(&self) -> Option<(&str, &str)> {
        let (access, refresh) = match self {
            Self::Email(e) => (&e.access_token, &e.refresh_token),
            Self::Text(t) => (&t.access_token, &t.refresh_token),
            Self::Message(m) => (&m.access_token, &m.refresh_token),
            Self::Test(_) => return None,
        };
        match (access, refresh) {
            (Some(a), Some(r)) => Some((a.as_str(), r.as_str())),
            _ => None,
        }
    }
}

// ─── Field tables ────────────────────────────────────────────────────────────

/// Logical fields of the packed layouts. `Body` doubles as the text of a
/// post and the body of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    From,
    To,
    Cc,
    Bcc,
    Subject,
    Body,
    AccessToken,
    RefreshToken,
}

/// V4 bitmap bits.
const BITMAP_TEXT: u8 = 0b0000_0001;
const BITMAP_IMAGE: u8 = 0b0000_0010;

/// Length-prefix width of the V4 image segment.
const IMAGE_LEN_WIDTH: Width = Width::Four;

/// Field table for one (format, service) pair. V1/V2 always carry the
/// full eight-field block; V3/V4 list only the fields the variant uses.
fn field_table(format: ContentFormat, service: ServiceKind) -> Vec<(Field, Width)> {
    let token_width = match format {
        ContentFormat::V1 => Width::One,
        _ => Width::Two,
    };
    match format {
        ContentFormat::V0 => Vec::new(),
        ContentFormat::V1 | ContentFormat::V2 => vec![
            (Field::From, Width::One),
            (Field::To, Width::Two),
            (Field::Cc, Width::Two),
            (Field::Bcc, Width::Two),
            (Field::Subject, Width::One),
            (Field::Body, Width::Two),
            (Field::AccessToken, token_width),
            (Field::RefreshToken, token_width),
        ],
        ContentFormat::V3 | ContentFormat::V4 => match service {
            ServiceKind::Email => vec![
                (Field::From, Width::One),
                (Field::To, Width::Two),
                (Field::Cc, Width::Two),
                (Field::Bcc, Width::Two),
                (Field::Subject, Width::One),
                (Field::Body, Width::Two),
                (Field::AccessToken, Width::Two),
                (Field::RefreshToken, Width::Two),
            ],
            ServiceKind::Text => vec![
                (Field::From, Width::One),
                (Field::Body, Width::Two),
                (Field::AccessToken, Width::Two),
                (Field::RefreshToken, Width::Two),
            ],
            ServiceKind::Message => vec![
                (Field::From, Width::One),
                (Field::To, Width::Two),
                (Field::Body, Width::Two),
                (Field::AccessToken, Width::Two),
                (Field::RefreshToken, Width::Two),
            ],
            ServiceKind::Test => vec![(Field::From, Width::One)],
        },
    }
}

// ─── Decoding ────────────────────────────────────────────────────────────────

/// Decode content bytes for the given format and platform service kind.
pub fn decode_content(
    format: ContentFormat,
    service: ServiceKind,
    bytes: &[u8],
) -> Result<ContentRecord, CodecError> {
    match format {
        ContentFormat::V0 => decode_delimited(service, bytes),
        _ => decode_packed(format, service, bytes),
    }
}

/// Collected values of a packed decode.
#[derive(Default)]
struct FieldValues {
    from: String,
    to: String,
    cc: String,
    bcc: String,
    subject: String,
    body: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    image: Option<Vec<u8>>,
}

impl FieldValues {
    fn set(&mut self, field: Field, value: String) {
        match field {
            Field::From => self.from = value,
            Field::To => self.to = value,
            Field::Cc => self.cc = value,
            Field::Bcc => self.bcc = value,
            Field::Subject => self.subject = value,
            Field::Body => self.body = value,
            // Zero-length token fields decode to an explicit absent value.
            Field::AccessToken => self.access_token = non_empty(value),
            Field::RefreshToken => self.refresh_token = non_empty(value),
        }
    }

    fn get(&self, field: Field) -> &str {
        match field {
            Field::From => &self.from,
            Field::To => &self.to,
            Field::Cc => &self.cc,
            Field::Bcc => &self.bcc,
            Field::Subject => &self.subject,
            Field::Body => &self.body,
            Field::AccessToken => self.access_token.as_deref().unwrap_or(""),
            Field::RefreshToken => self.refresh_token.as_deref().unwrap_or(""),
        }
    }

    fn into_record(self, service: ServiceKind) -> ContentRecord {
        match service {
            ServiceKind::Email => ContentRecord::Email(EmailContent {
                from: self.from,
                to: self.to,
                cc: self.cc,
                bcc: self.bcc,
                subject: self.subject,
                body: self.body,
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                image: self.image,
            }),
            ServiceKind::Text => ContentRecord::Text(TextContent {
                sender: self.from,
                text: self.body,
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                image: self.image,
            }),
            ServiceKind::Message => ContentRecord::Message(MessageContent {
                sender: self.from,
                receiver: self.to,
                message: self.body,
                access_token: self.access_token,
                refresh_token: self.refresh_token,
            }),
            ServiceKind::Test => ContentRecord::Test(TestContent { test_id: self.from }),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Decode the packed layouts (V1–V4): a block of length prefixes followed
/// by a block of payloads, with V4's bitmap gating which rows exist.
fn decode_packed(
    format: ContentFormat,
    service: ServiceKind,
    bytes: &[u8],
) -> Result<ContentRecord, CodecError> {
    let mut reader = FieldReader::new(bytes);

    let mut table = field_table(format, service);
    let mut has_image = false;
    if format == ContentFormat::V4 {
        let bitmap = reader
            .read_u8()
            .map_err(|_| CodecError::MalformedContent("missing content bitmap".into()))?;
        // Gated-off sections have no length prefix to skip.
        if bitmap & BITMAP_TEXT == 0 {
            table.retain(|(field, _)| *field != Field::Body);
        }
        has_image = bitmap & BITMAP_IMAGE != 0;
        // Only Email and Text carry an image segment.
        if has_image && !matches!(service, ServiceKind::Email | ServiceKind::Text) {
            return Err(CodecError::MalformedContent(format!(
                "image segment is not valid for {service:?} content"
            )));
        }
    }

    let mut lengths = Vec::with_capacity(table.len());
    for (field, width) in &table {
        let len = reader.read_len(*width).map_err(|_| {
            CodecError::MalformedContent(format!("truncated length prefix for {field:?}"))
        })?;
        lengths.push(len);
    }
    let image_len = if has_image {
        Some(reader.read_len(IMAGE_LEN_WIDTH).map_err(|_| {
            CodecError::MalformedContent("truncated image length prefix".into())
        })?)
    } else {
        None
    };

    let mut values = FieldValues::default();
    for ((field, _), len) in table.iter().zip(lengths) {
        let raw = reader.take(len).map_err(|_| {
            CodecError::LengthMismatch(format!(
                "declared length {len} for {field:?} exceeds remaining content"
            ))
        })?;
        let text = String::from_utf8(raw.to_vec()).map_err(|_| {
            CodecError::MalformedContent(format!("invalid utf-8 in {field:?}"))
        })?;
        values.set(*field, text);
    }
    if let Some(len) = image_len {
        let raw = reader.take(len).map_err(|_| {
            CodecError::LengthMismatch(format!(
                "declared image length {len} exceeds remaining content"
            ))
        })?;
        values.image = non_empty_bytes(raw);
    }

    if !reader.is_empty() {
        return Err(CodecError::MalformedContent(format!(
            "{} trailing byte(s) after content",
            reader.remaining()
        )));
    }

    Ok(values.into_record(service))
}

fn non_empty_bytes(raw: &[u8]) -> Option<Vec<u8>> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_vec())
    }
}

/// Decode the V0 delimiter-separated text layout.
fn decode_delimited(service: ServiceKind, bytes: &[u8]) -> Result<ContentRecord, CodecError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| CodecError::MalformedContent("content is not valid utf-8".into()))?;

    match service {
        ServiceKind::Email => {
            // 'from:to:cc:bcc:subject:body[:access_token[:refresh_token]]'
            let parts: Vec<&str> = text.splitn(8, ':').collect();
            if parts.len() < 6 {
                return Err(CodecError::MalformedContent(
                    "email content must have at least 6 parts".into(),
                ));
            }
            Ok(ContentRecord::Email(EmailContent {
                from: parts[0].to_string(),
                to: parts[1].to_string(),
                cc: parts[2].to_string(),
                bcc: parts[3].to_string(),
                subject: parts[4].to_string(),
                body: parts[5].to_string(),
                access_token: parts.get(6).and_then(|p| non_empty(p.to_string())),
                refresh_token: parts.get(7).and_then(|p| non_empty(p.to_string())),
                image: None,
            }))
        }
        ServiceKind::Text => {
            // 'sender:text[:access_token[:refresh_token]]'
            let parts: Vec<&str> = text.splitn(4, ':').collect();
            if parts.len() < 2 {
                return Err(CodecError::MalformedContent(
                    "text content must have at least 2 parts".into(),
                ));
            }
            Ok(ContentRecord::Text(TextContent {
                sender: parts[0].to_string(),
                text: parts[1].to_string(),
                access_token: parts.get(2).and_then(|p| non_empty(p.to_string())),
                refresh_token: parts.get(3).and_then(|p| non_empty(p.to_string())),
                image: None,
            }))
        }
        ServiceKind::Message => {
            // 'sender:receiver:message'
            let parts: Vec<&str> = text.splitn(3, ':').collect();
            if parts.len() != 3 {
                return Err(CodecError::MalformedContent(
                    "message content must have exactly 3 parts".into(),
                ));
            }
            Ok(ContentRecord::Message(MessageContent {
                sender: parts[0].to_string(),
                receiver: parts[1].to_string(),
                message: parts[2].to_string(),
                access_token: None,
                refresh_token: None,
            }))
        }
        // The whole content is the test id.
        ServiceKind::Test => Ok(ContentRecord::Test(TestContent {
            test_id: text.to_string(),
        })),
    }
}

// ─── Encoding ────────────────────────────────────────────────────────────────

/// Encode a content record in the given format. Inverse of
/// [`decode_content`]; used for round-trip tests and by adapters built in
/// this workspace.
pub fn encode_content(record: &ContentRecord, format: ContentFormat) -> Result<Vec<u8>, CodecError> {
    let service = record.service_kind();
    if format != ContentFormat::V4 && record_image(record).is_some() {
        return Err(CodecError::MalformedContent(format!(
            "{format:?} cannot carry an image segment"
        )));
    }

    match format {
        ContentFormat::V0 => encode_delimited(record),
        _ => {
            let values = record_values(record);
            let mut table = field_table(format, service);

            let mut out = Vec::new();
            if format == ContentFormat::V4 {
                let mut bitmap = 0u8;
                if !values.body.is_empty() {
                    bitmap |= BITMAP_TEXT;
                } else {
                    table.retain(|(field, _)| *field != Field::Body);
                }
                if values.image.is_some() {
                    bitmap |= BITMAP_IMAGE;
                }
                out.push(bitmap);
            }

            for (field, width) in &table {
                let value = values.get(*field);
                if !write_len(&mut out, *width, value.len()) {
                    return Err(CodecError::MalformedContent(format!(
                        "{field:?} value of {} bytes does not fit its {width:?} prefix",
                        value.len()
                    )));
                }
            }
            if format == ContentFormat::V4 {
                if let Some(image) = &values.image {
                    if !write_len(&mut out, IMAGE_LEN_WIDTH, image.len()) {
                        return Err(CodecError::MalformedContent(
                            "image segment too large".into(),
                        ));
                    }
                }
            }

            for (field, _) in &table {
                out.extend_from_slice(values.get(*field).as_bytes());
            }
            if let Some(image) = &values.image {
                out.extend_from_slice(image);
            }

            Ok(out)
        }
    }
}

fn record_image(record: &ContentRecord) -> Option<&Vec<u8>> {
    match record {
        ContentRecord::Email(e) => e.image.as_ref(),
        ContentRecord::Text(t) => t.image.as_ref(),
        _ => None,
    }
}

fn record_values(record: &ContentRecord) -> FieldValues {
    match record {
        ContentRecord::Email(e) => FieldValues {
            from: e.from.clone(),
            to: e.to.clone(),
            cc: e.cc.clone(),
            bcc: e.bcc.clone(),
            subject: e.subject.clone(),
            body: e.body.clone(),
            access_token: e.access_token.clone(),
            refresh_token: e.refresh_token.clone(),
            image: e.image.clone(),
        },
        ContentRecord::Text(t) => FieldValues {
            from: t.sender.clone(),
            body: t.text.clone(),
            access_token: t.access_token.clone(),
            refresh_token: t.refresh_token.clone(),
            image: t.image.clone(),
            ..Default::default()
        },
        ContentRecord::Message(m) => FieldValues {
            from: m.sender.clone(),
            to: m.receiver.clone(),
            body: m.message.clone(),
            access_token: m.access_token.clone(),
            refresh_token: m.refresh_token.clone(),
            ..Default::default()
        },
        ContentRecord::Test(t) => FieldValues {
            from: t.test_id.clone(),
            ..Default::default()
        },
    }
}

fn encode_delimited(record: &ContentRecord) -> Result<Vec<u8>, CodecError> {
    let text = match record {
        ContentRecord::Email(e) => {
            let mut parts = vec![
                e.from.as_str(),
                e.to.as_str(),
                e.cc.as_str(),
                e.bcc.as_str(),
                e.subject.as_str(),
                e.body.as_str(),
            ];
            if let (Some(access), Some(refresh)) = (&e.access_token, &e.refresh_token) {
                parts.push(access);
                parts.push(refresh);
            }
            parts.join(":")
        }
        ContentRecord::Text(t) => {
            let mut parts = vec![t.sender.as_str(), t.text.as_str()];
            if let (Some(access), Some(refresh)) = (&t.access_token, &t.refresh_token) {
                parts.push(access);
                parts.push(refresh);
            }
            parts.join(":")
        }
        ContentRecord::Message(m) => {
            [m.sender.as_str(), m.receiver.as_str(), m.message.as_str()].join(":")
        }
        ContentRecord::Test(t) => t.test_id.clone(),
    };
    Ok(text.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKED_FORMATS: [ContentFormat; 4] = [
        ContentFormat::V1,
        ContentFormat::V2,
        ContentFormat::V3,
        ContentFormat::V4,
    ];

    fn email() -> ContentRecord {
        ContentRecord::Email(EmailContent {
            from: "alice@example.com".into(),
            to: "bob@example.com".into(),
            cc: String::new(),
            bcc: String::new(),
            subject: "hello".into(),
            body: "a body".into(),
            access_token: Some("at-123".into()),
            refresh_token: Some("rt-456".into()),
            image: None,
        })
    }

    fn text_post() -> ContentRecord {
        ContentRecord::Text(TextContent {
            sender: "alice".into(),
            text: "hi".into(),
            access_token: None,
            refresh_token: None,
            image: None,
        })
    }

    fn chat() -> ContentRecord {
        ContentRecord::Message(MessageContent {
            sender: "+23712345".into(),
            receiver: "+23767890".into(),
            message: "see you at 5".into(),
            access_token: None,
            refresh_token: None,
        })
    }

    fn probe() -> ContentRecord {
        ContentRecord::Test(TestContent {
            test_id: "421".into(),
        })
    }

    #[test]
    fn roundtrip_every_format_and_variant() {
        for format in PACKED_FORMATS {
            for record in [email(), text_post(), chat(), probe()] {
                let bytes = encode_content(&record, format).unwrap();
                let decoded = decode_content(format, record.service_kind(), &bytes).unwrap();
                assert_eq!(decoded, record, "{format:?}");
            }
        }
        for record in [email(), text_post(), chat(), probe()] {
            let bytes = encode_content(&record, ContentFormat::V0).unwrap();
            let decoded =
                decode_content(ContentFormat::V0, record.service_kind(), &bytes).unwrap();
            assert_eq!(decoded, record, "V0");
        }
    }

    #[test]
    fn v0_text_with_tokens() {
        let decoded = decode_content(
            ContentFormat::V0,
            ServiceKind::Text,
            b"alice:hello world:tok-a:tok-r",
        )
        .unwrap();
        match decoded {
            ContentRecord::Text(t) => {
                assert_eq!(t.sender, "alice");
                assert_eq!(t.text, "hello world");
                assert_eq!(t.access_token.as_deref(), Some("tok-a"));
                assert_eq!(t.refresh_token.as_deref(), Some("tok-r"));
            }
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn v0_email_requires_six_parts() {
        let err = decode_content(ContentFormat::V0, ServiceKind::Email, b"a:b:c").unwrap_err();
        assert!(matches!(err, CodecError::MalformedContent(_)));
    }

    #[test]
    fn v0_message_requires_exactly_three_parts() {
        assert!(decode_content(ContentFormat::V0, ServiceKind::Message, b"a:b").is_err());
        let ok = decode_content(ContentFormat::V0, ServiceKind::Message, b"a:b:c:d").unwrap();
        match ok {
            // The third split keeps embedded colons in the message body.
            ContentRecord::Message(m) => assert_eq!(m.message, "c:d"),
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn zero_length_tokens_decode_as_absent() {
        let record = ContentRecord::Text(TextContent {
            sender: "alice".into(),
            text: "hi".into(),
            ..Default::default()
        });
        for format in PACKED_FORMATS {
            let bytes = encode_content(&record, format).unwrap();
            let decoded = decode_content(format, ServiceKind::Text, &bytes).unwrap();
            match decoded {
                ContentRecord::Text(t) => {
                    assert_eq!(t.access_token, None, "{format:?}");
                    assert_eq!(t.refresh_token, None, "{format:?}");
                }
                other => panic!("expected Text, got {other:?}"),
            }
        }
    }

    #[test]
    fn v1_token_prefix_is_one_byte_v2_two() {
        let record = text_post();
        let v1 = encode_content(&record, ContentFormat::V1).unwrap();
        let v2 = encode_content(&record, ContentFormat::V2).unwrap();
        // Same eight-field block; V2 spends one extra byte on each token prefix.
        assert_eq!(v2.len(), v1.len() + 2);
    }

    #[test]
    fn v3_omits_inapplicable_fields() {
        let record = text_post();
        let v2 = encode_content(&record, ContentFormat::V2).unwrap();
        let v3 = encode_content(&record, ContentFormat::V3).unwrap();
        assert!(v3.len() < v2.len());
    }

    #[test]
    fn v4_bitmap_gates_text_section() {
        let record = ContentRecord::Text(TextContent {
            sender: "alice".into(),
            text: String::new(),
            ..Default::default()
        });
        let bytes = encode_content(&record, ContentFormat::V4).unwrap();
        // bit0 clear: no text prefix emitted at all.
        assert_eq!(bytes[0] & 0b1, 0);
        let decoded = decode_content(ContentFormat::V4, ServiceKind::Text, &bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn v4_image_segment_roundtrip() {
        let record = ContentRecord::Text(TextContent {
            sender: "alice".into(),
            text: "caption".into(),
            access_token: None,
            refresh_token: None,
            image: Some(vec![0x89, 0x50, 0x4e, 0x47]),
        });
        let bytes = encode_content(&record, ContentFormat::V4).unwrap();
        assert_eq!(bytes[0] & 0b10, 0b10);
        let decoded = decode_content(ContentFormat::V4, ServiceKind::Text, &bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn v4_image_bit_rejected_for_imageless_services() {
        // bit1 set for a service that never carries an image segment.
        let err = decode_content(ContentFormat::V4, ServiceKind::Message, &[0b11]).unwrap_err();
        assert!(matches!(err, CodecError::MalformedContent(_)));
        let err = decode_content(ContentFormat::V4, ServiceKind::Test, &[0b11]).unwrap_err();
        assert!(matches!(err, CodecError::MalformedContent(_)));
    }

    #[test]
    fn image_rejected_outside_v4() {
        let record = ContentRecord::Text(TextContent {
            sender: "alice".into(),
            text: "caption".into(),
            access_token: None,
            refresh_token: None,
            image: Some(vec![1, 2, 3]),
        });
        assert!(encode_content(&record, ContentFormat::V3).is_err());
    }

    #[test]
    fn truncated_packed_content_is_rejected() {
        let bytes = encode_content(&email(), ContentFormat::V2).unwrap();
        let err =
            decode_content(ContentFormat::V2, ServiceKind::Email, &bytes[..bytes.len() - 3])
                .unwrap_err();
        assert!(matches!(err, CodecError::LengthMismatch(_)));
    }

    #[test]
    fn oversized_field_rejected_at_encode() {
        let record = ContentRecord::Text(TextContent {
            sender: "s".repeat(300),
            text: "hi".into(),
            ..Default::default()
        });
        // The sender prefix is one byte wide in every packed format.
        assert!(encode_content(&record, ContentFormat::V1).is_err());
    }

    #[test]
    fn spec_scenario_v1_text() {
        // Content-format V1 text with sender "alice", body "hi", no tokens.
        let bytes = encode_content(&text_post(), ContentFormat::V1).unwrap();
        let decoded = decode_content(ContentFormat::V1, ServiceKind::Text, &bytes).unwrap();
        match decoded {
            ContentRecord::Text(t) => {
                assert_eq!(t.sender, "alice");
                assert_eq!(t.text, "hi");
                assert_eq!(t.access_token, None);
            }
            other => panic!("expected Text, got {other:?}"),
        }
    }
}
