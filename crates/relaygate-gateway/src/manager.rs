//! The relay manager — orchestrates publish and auth flows.
//!
//! One operation per service-surface RPC. Each operation validates its
//! fields, resolves the platform through the registry (consulting the
//! discovery hook once on a miss), checks the adapter's declared
//! capability family, and drives the typed request through the IPC
//! handler. Dispatch switches exhaustively on the manifest's protocol
//! tag; the manager never probes a live process for what it can do.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::ipc::IpcHandler;
use crate::notify::{LogNotifier, PublicationNotifier, PublishStatus};
use crate::registry::{AdapterManifest, AdapterRegistry};
use crate::reliability::{ProbeTimes, ReliabilityScorer, WindowScorer};
use crate::vault::{InMemoryVault, TokenMetadata, TokenVault};
use async_trait::async_trait;
use relaygate_codec::{ContentRecord, Envelope, ServiceKind};
use relaygate_proto::{AdapterRequest, AdapterResponse, ProtocolKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Installation hook consulted when a platform is not in the registry.
/// Returning `true` means "I installed it, look again".
#[async_trait]
pub trait AdapterDiscovery: Send + Sync {
    async fn install(&self, platform: &str) -> bool;
}

/// Default discovery: nothing gets installed at runtime.
#[derive(Debug, Default)]
pub struct NoDiscovery;

#[async_trait]
impl AdapterDiscovery for NoDiscovery {
    async fn install(&self, _platform: &str) -> bool {
        false
    }
}

/// Uniform result of a publish dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub success: bool,
    pub message: String,
    /// The platform's native response, passed through verbatim.
    pub publisher_response: Option<serde_json::Value>,
    /// Set when the stored token could not be refreshed and the dispatch
    /// went out with stale credentials.
    pub needs_reauth: bool,
}

impl DispatchOutcome {
    fn ok(message: String, publisher_response: Option<serde_json::Value>, needs_reauth: bool) -> Self {
        Self {
            success: true,
            message,
            publisher_response,
            needs_reauth,
        }
    }

    /// Uniform failure shape for the service surface.
    pub fn failure(error: &GatewayError) -> Self {
        let publisher_response = match error {
            GatewayError::PlatformApi { payload, .. } => payload.clone(),
            _ => None,
        };
        Self {
            success: false,
            message: error.to_string(),
            publisher_response,
            needs_reauth: false,
        }
    }
}

/// OAuth2 authorization handshake material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Authorization {
    pub url: String,
    pub state: String,
    pub code_verifier: Option<String>,
}

/// Result of a PNBA code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PnbaExchange {
    /// The account still needs its two-step password before tokens exist.
    pub two_step_required: bool,
    pub account_identifier: Option<String>,
}

/// The dispatch orchestrator.
pub struct RelayManager {
    registry: AdapterRegistry,
    ipc: Arc<IpcHandler>,
    vault: Arc<dyn TokenVault>,
    discovery: Arc<dyn AdapterDiscovery>,
    scorer: Arc<dyn ReliabilityScorer>,
    notifier: Arc<dyn PublicationNotifier>,
    config: GatewayConfig,
}

impl RelayManager {
    /// Build a manager with default collaborators: in-memory vault, no
    /// runtime discovery, window scorer, log notifier.
    pub fn new(registry: AdapterRegistry, config: GatewayConfig) -> Self {
        let ipc = Arc::new(IpcHandler::new(
            config.max_inflight,
            Duration::from_secs(config.shutdown_grace_secs),
        ));
        let scorer = Arc::new(WindowScorer::new(Duration::from_secs(
            config.test_success_window_secs,
        )));
        Self {
            registry,
            ipc,
            vault: Arc::new(InMemoryVault::new()),
            discovery: Arc::new(NoDiscovery),
            scorer,
            notifier: Arc::new(LogNotifier),
            config,
        }
    }

    pub fn with_vault(mut self, vault: Arc<dyn TokenVault>) -> Self {
        self.vault = vault;
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn AdapterDiscovery>) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ReliabilityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn PublicationNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn ipc(&self) -> &Arc<IpcHandler> {
        &self.ipc
    }

    // ── OAuth2 operations ───────────────────────────────────────────────

    pub async fn get_oauth2_authorization_url(
        &self,
        platform: &str,
        state: Option<String>,
        code_verifier: Option<String>,
        redirect_url: Option<String>,
    ) -> GatewayResult<OAuth2Authorization> {
        require("platform", platform)?;
        let manifest = self.resolve(platform, Some(ProtocolKind::OAuth2)).await?;
        let response = self
            .call(
                &manifest,
                AdapterRequest::GetAuthorizationUrl {
                    state,
                    code_verifier,
                    redirect_url,
                },
            )
            .await?;
        match response {
            AdapterResponse::AuthorizationUrl {
                url,
                state,
                code_verifier,
            } => Ok(OAuth2Authorization {
                url,
                state,
                code_verifier,
            }),
            other => Err(unexpected(&manifest.name, "authorization_url", &other)),
        }
    }

    /// Exchange an OAuth2 code and persist the resulting tokens. Returns
    /// the account identifier the adapter reported.
    pub async fn exchange_oauth2_code_and_store(
        &self,
        platform: &str,
        code: &str,
        code_verifier: Option<String>,
        redirect_url: Option<String>,
    ) -> GatewayResult<String> {
        require("platform", platform)?;
        require("code", code)?;
        let manifest = self.resolve(platform, Some(ProtocolKind::OAuth2)).await?;
        let response = self
            .call(
                &manifest,
                AdapterRequest::ExchangeCode {
                    code: code.to_string(),
                    code_verifier,
                    redirect_url,
                },
            )
            .await?;
        match response {
            AdapterResponse::TokenSet {
                access_token,
                refresh_token,
                account_identifier,
            } => {
                self.vault
                    .put_token(
                        platform,
                        &account_identifier,
                        TokenMetadata {
                            access_token,
                            refresh_token: Some(refresh_token),
                            expires_at: None,
                        },
                    )
                    .await?;
                info!(platform, account = %account_identifier, "Stored exchanged token");
                Ok(account_identifier)
            }
            other => Err(unexpected(&manifest.name, "token_set", &other)),
        }
    }

    /// Revoke at the platform first, then delete from the vault, so a
    /// vault miss never strands a live remote grant.
    pub async fn revoke_and_delete_oauth2_token(
        &self,
        platform: &str,
        account: &str,
    ) -> GatewayResult<()> {
        require("platform", platform)?;
        require("account", account)?;
        let manifest = self.resolve(platform, Some(ProtocolKind::OAuth2)).await?;
        let response = self
            .call(
                &manifest,
                AdapterRequest::Revoke {
                    account_identifier: account.to_string(),
                },
            )
            .await?;
        match response {
            AdapterResponse::Revoked => {
                self.vault.delete_token(platform, account).await?;
                info!(platform, account, "Revoked and deleted token");
                Ok(())
            }
            other => Err(unexpected(&manifest.name, "revoked", &other)),
        }
    }

    // ── PNBA operations ─────────────────────────────────────────────────

    pub async fn get_pnba_code(&self, platform: &str, phone_number: &str) -> GatewayResult<()> {
        require("platform", platform)?;
        require("phone_number", phone_number)?;
        let manifest = self.resolve(platform, Some(ProtocolKind::Pnba)).await?;
        let response = self
            .call(
                &manifest,
                AdapterRequest::RequestCode {
                    phone_number: phone_number.to_string(),
                },
            )
            .await?;
        match response {
            AdapterResponse::CodeRequested => Ok(()),
            other => Err(unexpected(&manifest.name, "code_requested", &other)),
        }
    }

    pub async fn exchange_pnba_code_and_store(
        &self,
        platform: &str,
        phone_number: &str,
        code: &str,
        password: Option<String>,
    ) -> GatewayResult<PnbaExchange> {
        require("platform", platform)?;
        require("phone_number", phone_number)?;
        require("code", code)?;
        let manifest = self.resolve(platform, Some(ProtocolKind::Pnba)).await?;
        let response = self
            .call(
                &manifest,
                AdapterRequest::ExchangePnbaCode {
                    phone_number: phone_number.to_string(),
                    code: code.to_string(),
                    password,
                },
            )
            .await?;
        match response {
            AdapterResponse::PnbaToken {
                token_material,
                two_step_required,
                account_identifier,
            } => {
                if let Some(material) = token_material {
                    let account = account_identifier
                        .clone()
                        .unwrap_or_else(|| phone_number.to_string());
                    self.vault
                        .put_token(
                            platform,
                            &account,
                            TokenMetadata {
                                access_token: material,
                                refresh_token: None,
                                expires_at: None,
                            },
                        )
                        .await?;
                    info!(platform, account = %account, "Stored PNBA token");
                    Ok(PnbaExchange {
                        two_step_required: false,
                        account_identifier: Some(account),
                    })
                } else {
                    Ok(PnbaExchange {
                        two_step_required,
                        account_identifier,
                    })
                }
            }
            other => Err(unexpected(&manifest.name, "pnba_token", &other)),
        }
    }

    pub async fn revoke_and_delete_pnba_token(
        &self,
        platform: &str,
        account: &str,
    ) -> GatewayResult<()> {
        require("platform", platform)?;
        require("account", account)?;
        let manifest = self.resolve(platform, Some(ProtocolKind::Pnba)).await?;
        let response = self
            .call(
                &manifest,
                AdapterRequest::RevokePnba {
                    account_identifier: account.to_string(),
                },
            )
            .await?;
        match response {
            AdapterResponse::Revoked => {
                self.vault.delete_token(platform, account).await?;
                Ok(())
            }
            other => Err(unexpected(&manifest.name, "revoked", &other)),
        }
    }

    // ── Publish ─────────────────────────────────────────────────────────

    /// Dispatch one decoded envelope whose ciphertext has already been
    /// decrypted to `plaintext` by the caller.
    pub async fn publish_content(
        &self,
        envelope: &Envelope,
        plaintext: &[u8],
    ) -> GatewayResult<DispatchOutcome> {
        let manifest = self.resolve_shortcode(envelope.platform_shortcode).await?;
        let record = relaygate_codec::decode_content(
            envelope.version.content_format(),
            manifest.service,
            plaintext,
        )?;

        // Reliability probes never leave the gateway.
        if let ContentRecord::Test(test) = &record {
            let message = self.record_probe(test.test_id.clone()).await?;
            self.notifier
                .publish_status(
                    &manifest.name,
                    PublishStatus::Published,
                    None,
                    envelope.language.as_deref(),
                )
                .await;
            return Ok(DispatchOutcome::ok(message, None, false));
        }

        let deadline = Instant::now() + self.config.call_timeout();
        let (access_token, needs_reauth) = self
            .resolve_token(&manifest, &record, deadline)
            .await?;

        let content = content_to_json(&record);
        let request = match manifest.protocol {
            ProtocolKind::Event => AdapterRequest::Create {
                resource: manifest.service.to_string(),
                payload: content,
            },
            ProtocolKind::OAuth2 | ProtocolKind::Pnba => AdapterRequest::Publish {
                content,
                access_token,
            },
        };

        let result = self.call_with_deadline(&manifest, request, deadline).await;
        let status = if result.is_ok() {
            PublishStatus::Published
        } else {
            PublishStatus::Failed
        };
        self.notifier
            .publish_status(&manifest.name, status, None, envelope.language.as_deref())
            .await;

        match result? {
            AdapterResponse::EventResult { result } | AdapterResponse::Published { result } => {
                Ok(DispatchOutcome::ok(
                    format!("published {} content to {}", manifest.service, manifest.name),
                    Some(result),
                    needs_reauth,
                ))
            }
            other => Err(unexpected(&manifest.name, "publish result", &other)),
        }
    }

    async fn record_probe(&self, test_id: String) -> GatewayResult<String> {
        match ProbeTimes::parse(&test_id) {
            Ok(probe) => self.scorer.record_probe(probe).await,
            // Bare test id, no timing payload.
            Err(_) => Ok(format!("reliability probe {test_id} received")),
        }
    }

    /// Work out the access token for a publish. Content-carried tokens
    /// win and skip the vault entirely; otherwise the stored token is
    /// refreshed when expired, inside the same deadline budget as the
    /// publish itself.
    async fn resolve_token(
        &self,
        manifest: &AdapterManifest,
        record: &ContentRecord,
        deadline: Instant,
    ) -> GatewayResult<(Option<String>, bool)> {
        if manifest.protocol == ProtocolKind::Event {
            return Ok((None, false));
        }
        if let Some((access, _refresh)) = record.token_override() {
            debug!(adapter = %manifest.name, "Using content-carried token override");
            return Ok((Some(access.to_string()), false));
        }

        let account = record.account_identifier();
        let Some(token) = self.vault.get_token(&manifest.name, account).await? else {
            return Err(GatewayError::Vault(format!(
                "no token stored for {account} on {}",
                manifest.name
            )));
        };
        if !token.is_expired(chrono::Utc::now()) {
            return Ok((Some(token.access_token), false));
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(GatewayError::TokenExpiredNoRefresh {
                platform: manifest.name.clone(),
                account: account.to_string(),
            });
        };
        match self
            .call_with_deadline(
                manifest,
                AdapterRequest::RefreshToken { refresh_token },
                deadline,
            )
            .await
        {
            Ok(AdapterResponse::Refreshed {
                access_token,
                refresh_token,
            }) => {
                self.vault
                    .put_token(
                        &manifest.name,
                        account,
                        TokenMetadata {
                            access_token: access_token.clone(),
                            refresh_token: Some(refresh_token),
                            expires_at: None,
                        },
                    )
                    .await?;
                info!(adapter = %manifest.name, account, "Refreshed expired token");
                Ok((Some(access_token), false))
            }
            Ok(other) => Err(unexpected(&manifest.name, "refreshed", &other)),
            // Dispatch anyway with the stale token; the caller is told to
            // reauthenticate.
            Err(e) => {
                warn!(adapter = %manifest.name, account, error = %e,
                    "Token refresh failed, dispatching with stale token");
                Ok((Some(token.access_token), true))
            }
        }
    }

    // ── Resolution and dispatch plumbing ────────────────────────────────

    async fn resolve(
        &self,
        platform: &str,
        required: Option<ProtocolKind>,
    ) -> GatewayResult<AdapterManifest> {
        let manifest = match self.registry.lookup(platform) {
            Ok(m) => m,
            Err(GatewayError::NotFound(_)) => {
                // One discovery attempt, then give up.
                if self.discovery.install(platform).await {
                    self.registry
                        .lookup(platform)
                        .map_err(|_| GatewayError::UnknownPlatform(platform.to_string()))?
                } else {
                    return Err(GatewayError::UnknownPlatform(platform.to_string()));
                }
            }
            Err(e) => return Err(e),
        };
        check_capability(&manifest, required)?;
        Ok(manifest)
    }

    async fn resolve_shortcode(&self, shortcode: u8) -> GatewayResult<AdapterManifest> {
        self.registry.lookup_shortcode(shortcode)
    }

    async fn call(
        &self,
        manifest: &AdapterManifest,
        request: AdapterRequest,
    ) -> GatewayResult<AdapterResponse> {
        let deadline = Instant::now() + self.config.call_timeout();
        self.call_with_deadline(manifest, request, deadline).await
    }

    async fn call_with_deadline(
        &self,
        manifest: &AdapterManifest,
        request: AdapterRequest,
        deadline: Instant,
    ) -> GatewayResult<AdapterResponse> {
        match self.ipc.call(manifest, request, deadline).await? {
            AdapterResponse::Error { message, detail } => Err(GatewayError::PlatformApi {
                message,
                payload: detail,
            }),
            response => Ok(response),
        }
    }

    /// Graceful shutdown of all warm adapter processes.
    pub async fn shutdown(&self) {
        self.ipc.shutdown().await;
    }
}

fn check_capability(
    manifest: &AdapterManifest,
    required: Option<ProtocolKind>,
) -> GatewayResult<()> {
    match required {
        Some(required) if manifest.protocol != required => {
            Err(GatewayError::CapabilityMismatch {
                adapter: manifest.name.clone(),
                declared: manifest.protocol.to_string(),
                required: required.to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn require(field: &'static str, value: &str) -> GatewayResult<()> {
    if value.trim().is_empty() {
        Err(GatewayError::MissingField(field))
    } else {
        Ok(())
    }
}

fn unexpected(adapter: &str, expected: &str, got: &AdapterResponse) -> GatewayError {
    GatewayError::IpcProtocolError {
        adapter: adapter.to_string(),
        reason: format!("expected {expected} response, got {got:?}"),
    }
}

/// JSON shape of decoded content as handed to adapters.
fn content_to_json(record: &ContentRecord) -> serde_json::Value {
    match record {
        ContentRecord::Email(e) => serde_json::json!({
            "service": ServiceKind::Email.to_string(),
            "from": e.from,
            "to": e.to,
            "cc": e.cc,
            "bcc": e.bcc,
            "subject": e.subject,
            "body": e.body,
        }),
        ContentRecord::Text(t) => serde_json::json!({
            "service": ServiceKind::Text.to_string(),
            "sender": t.sender,
            "text": t.text,
            "has_image": t.image.is_some(),
        }),
        ContentRecord::Message(m) => serde_json::json!({
            "service": ServiceKind::Message.to_string(),
            "sender": m.sender,
            "receiver": m.receiver,
            "message": m.message,
        }),
        ContentRecord::Test(t) => serde_json::json!({
            "service": ServiceKind::Test.to_string(),
            "test_id": t.test_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LaunchSpec;
    use relaygate_codec::TextContent;
    use std::collections::BTreeSet;

    fn manifest(protocol: ProtocolKind) -> AdapterManifest {
        AdapterManifest {
            name: "twitter".into(),
            shortcode: 't',
            service: ServiceKind::Text,
            protocol,
            launch: LaunchSpec {
                command: "twitter-adapter".into(),
                args: vec![],
                env: vec![],
            },
            capabilities: BTreeSet::new(),
            schema_version: 1,
        }
    }

    #[test]
    fn capability_check() {
        let m = manifest(ProtocolKind::Pnba);
        assert!(check_capability(&m, None).is_ok());
        assert!(check_capability(&m, Some(ProtocolKind::Pnba)).is_ok());
        let err = check_capability(&m, Some(ProtocolKind::OAuth2)).unwrap_err();
        match err {
            GatewayError::CapabilityMismatch {
                declared, required, ..
            } => {
                assert_eq!(declared, "pnba");
                assert_eq!(required, "oauth2");
            }
            other => panic!("expected CapabilityMismatch, got {other:?}"),
        }
    }

    #[test]
    fn empty_fields_are_rejected() {
        assert!(matches!(
            require("platform", "  "),
            Err(GatewayError::MissingField("platform"))
        ));
        assert!(require("platform", "gmail").is_ok());
    }

    #[test]
    fn content_json_carries_service_tag() {
        let record = ContentRecord::Text(TextContent {
            sender: "alice".into(),
            text: "hi".into(),
            ..Default::default()
        });
        let json = content_to_json(&record);
        assert_eq!(json["service"], "text");
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn failure_outcome_carries_platform_payload() {
        let err = GatewayError::PlatformApi {
            message: "rate limited".into(),
            payload: Some(serde_json::json!({"code": 429})),
        };
        let outcome = DispatchOutcome::failure(&err);
        assert!(!outcome.success);
        assert!(outcome.message.contains("rate limited"));
        assert_eq!(outcome.publisher_response.unwrap()["code"], 429);
    }

    #[tokio::test]
    async fn unknown_platform_after_discovery_declines() {
        let manager = RelayManager::new(AdapterRegistry::new(), GatewayConfig::default());
        let err = manager
            .get_oauth2_authorization_url("nowhere", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownPlatform(_)));
    }

    #[tokio::test]
    async fn discovery_install_is_retried_once() {
        struct Installer(AdapterRegistry);

        #[async_trait]
        impl AdapterDiscovery for Installer {
            async fn install(&self, platform: &str) -> bool {
                let mut m = manifest(ProtocolKind::OAuth2);
                m.name = platform.to_string();
                self.0.register(m).is_ok()
            }
        }

        let registry = AdapterRegistry::new();
        let manager = RelayManager::new(registry.clone(), GatewayConfig::default())
            .with_discovery(Arc::new(Installer(registry.clone())));
        // Resolution now succeeds; the call itself fails to spawn the
        // nonexistent adapter binary, which proves we got past lookup.
        let err = manager
            .get_oauth2_authorization_url("gmail", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AdapterSpawnFailure { .. }));
        assert!(registry.lookup("gmail").is_ok());
    }
}
