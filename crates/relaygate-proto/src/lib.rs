//! Protocol interface contracts between the gateway and adapter processes.
//!
//! Every adapter implements exactly one capability family — OAuth2, PNBA
//! (phone-number-based authentication) or Event (generic CRUD) — plus the
//! Base operations every adapter answers (`get_manifest`, `configure`,
//! `shutdown`). The gateway dispatches strictly by the protocol kind the
//! adapter's installed manifest declares; it never probes a live process
//! for what it can do.
//!
//! Requests and responses travel as newline-delimited JSON over the
//! adapter process's stdio, wrapped in an [`ipc::IpcMessage`] carrying the
//! correlation id.

pub mod ipc;

pub use ipc::{decode_line, encode_line, FrameError, IpcMessage, IpcMessageKind};

use serde::{Deserialize, Serialize};

/// The capability family an adapter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    #[serde(rename = "oauth2")]
    OAuth2,
    #[serde(rename = "pnba")]
    Pnba,
    #[serde(rename = "event")]
    Event,
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OAuth2 => write!(f, "oauth2"),
            Self::Pnba => write!(f, "pnba"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// Requests the gateway sends to an adapter process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AdapterRequest {
    // Base — served by every adapter.
    GetManifest,
    Configure {
        settings: serde_json::Value,
    },
    Shutdown,
    /// Deliver decoded content to the platform. Every adapter serves
    /// this; the shape of `content` follows the platform's service kind.
    Publish {
        content: serde_json::Value,
        #[serde(default)]
        access_token: Option<String>,
    },

    // OAuth2.
    GetAuthorizationUrl {
        #[serde(default)]
        state: Option<String>,
        #[serde(default)]
        code_verifier: Option<String>,
        #[serde(default)]
        redirect_url: Option<String>,
    },
    ExchangeCode {
        code: String,
        #[serde(default)]
        code_verifier: Option<String>,
        #[serde(default)]
        redirect_url: Option<String>,
    },
    RefreshToken {
        refresh_token: String,
    },
    Revoke {
        account_identifier: String,
    },

    // PNBA.
    RequestCode {
        phone_number: String,
    },
    ExchangePnbaCode {
        phone_number: String,
        code: String,
        #[serde(default)]
        password: Option<String>,
    },
    RevokePnba {
        account_identifier: String,
    },

    // Event — generic CRUD envelope for event-driven platforms.
    Create {
        resource: String,
        payload: serde_json::Value,
    },
    Read {
        resource: String,
        payload: serde_json::Value,
    },
    Update {
        resource: String,
        payload: serde_json::Value,
    },
    Delete {
        resource: String,
        payload: serde_json::Value,
    },
}

impl AdapterRequest {
    /// The capability family that must be declared to serve this request.
    /// `None` for Base operations, which every adapter answers.
    pub fn required_protocol(&self) -> Option<ProtocolKind> {
        match self {
            Self::GetManifest | Self::Configure { .. } | Self::Shutdown | Self::Publish { .. } => {
                None
            }
            Self::GetAuthorizationUrl { .. }
            | Self::ExchangeCode { .. }
            | Self::RefreshToken { .. }
            | Self::Revoke { .. } => Some(ProtocolKind::OAuth2),
            Self::RequestCode { .. }
            | Self::ExchangePnbaCode { .. }
            | Self::RevokePnba { .. } => Some(ProtocolKind::Pnba),
            Self::Create { .. } | Self::Read { .. } | Self::Update { .. } | Self::Delete { .. } => {
                Some(ProtocolKind::Event)
            }
        }
    }

    /// Wire method name, for logging.
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::GetManifest => "get_manifest",
            Self::Configure { .. } => "configure",
            Self::Shutdown => "shutdown",
            Self::Publish { .. } => "publish",
            Self::GetAuthorizationUrl { .. } => "get_authorization_url",
            Self::ExchangeCode { .. } => "exchange_code",
            Self::RefreshToken { .. } => "refresh_token",
            Self::Revoke { .. } => "revoke",
            Self::RequestCode { .. } => "request_code",
            Self::ExchangePnbaCode { .. } => "exchange_pnba_code",
            Self::RevokePnba { .. } => "revoke_pnba",
            Self::Create { .. } => "create",
            Self::Read { .. } => "read",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Responses an adapter process sends back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AdapterResponse {
    /// Base: adapter self-description.
    Manifest {
        name: String,
        version: String,
        capabilities: Vec<String>,
    },
    /// Base: settings applied.
    Configured,
    /// The platform's native response to a delivery, passed through
    /// verbatim.
    Published {
        result: serde_json::Value,
    },

    /// OAuth2: authorization URL for the user to visit.
    AuthorizationUrl {
        url: String,
        state: String,
        #[serde(default)]
        code_verifier: Option<String>,
    },
    /// OAuth2: tokens from a code exchange.
    TokenSet {
        access_token: String,
        refresh_token: String,
        account_identifier: String,
    },
    /// OAuth2: tokens from a refresh.
    Refreshed {
        access_token: String,
        refresh_token: String,
    },
    /// OAuth2 / PNBA: token revoked.
    Revoked,

    /// PNBA: verification code sent to the phone.
    CodeRequested,
    /// PNBA: result of a code exchange. When the account has two-step
    /// verification enabled no token material is returned yet.
    PnbaToken {
        #[serde(default)]
        token_material: Option<String>,
        #[serde(default)]
        two_step_required: bool,
        #[serde(default)]
        account_identifier: Option<String>,
    },

    /// Event: the platform's native response, passed through verbatim.
    EventResult {
        result: serde_json::Value,
    },

    /// The adapter-side failure, with the platform's verbatim error
    /// payload when one exists.
    Error {
        message: String,
        #[serde(default)]
        detail: Option<serde_json::Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_json_carries_method_tag() {
        let req = AdapterRequest::GetAuthorizationUrl {
            state: Some("xyz".into()),
            code_verifier: None,
            redirect_url: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"method\":\"get_authorization_url\""));
        assert!(json.contains("\"state\":\"xyz\""));
    }

    #[test]
    fn required_protocol_per_family() {
        assert_eq!(AdapterRequest::GetManifest.required_protocol(), None);
        assert_eq!(
            AdapterRequest::RefreshToken {
                refresh_token: "rt".into()
            }
            .required_protocol(),
            Some(ProtocolKind::OAuth2)
        );
        assert_eq!(
            AdapterRequest::RequestCode {
                phone_number: "+237".into()
            }
            .required_protocol(),
            Some(ProtocolKind::Pnba)
        );
        assert_eq!(
            AdapterRequest::Create {
                resource: "post".into(),
                payload: serde_json::json!({}),
            }
            .required_protocol(),
            Some(ProtocolKind::Event)
        );
    }

    #[test]
    fn response_roundtrip() {
        let resp = AdapterResponse::PnbaToken {
            token_material: None,
            two_step_required: true,
            account_identifier: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        let decoded: AdapterResponse = serde_json::from_str(&json).unwrap();
        match decoded {
            AdapterResponse::PnbaToken {
                two_step_required, ..
            } => assert!(two_step_required),
            other => panic!("expected PnbaToken, got {other:?}"),
        }
    }

    #[test]
    fn error_detail_is_passed_through() {
        let json = r#"{"method":"error","message":"rate limited","detail":{"code":429}}"#;
        let decoded: AdapterResponse = serde_json::from_str(json).unwrap();
        match decoded {
            AdapterResponse::Error { message, detail } => {
                assert_eq!(message, "rate limited");
                assert_eq!(detail.unwrap()["code"], 429);
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn protocol_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&ProtocolKind::OAuth2).unwrap(),
            "\"oauth2\""
        );
        assert_eq!(serde_json::to_string(&ProtocolKind::Pnba).unwrap(), "\"pnba\"");
        let decoded: ProtocolKind = serde_json::from_str("\"event\"").unwrap();
        assert_eq!(decoded, ProtocolKind::Event);
    }
}
