//! Token storage collaborator.
//!
//! The gateway never persists tokens itself; the host wires in a vault.
//! [`InMemoryVault`] backs tests and single-process deployments.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Stored credentials for one account on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub access_token: String,
    /// Empty when the platform issued no refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unset means the token does not expire (or expiry is unknown).
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenMetadata {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Host-provided token store, keyed by platform and account identifier.
#[async_trait]
pub trait TokenVault: Send + Sync {
    async fn get_token(&self, platform: &str, account: &str)
        -> GatewayResult<Option<TokenMetadata>>;
    async fn put_token(
        &self,
        platform: &str,
        account: &str,
        token: TokenMetadata,
    ) -> GatewayResult<()>;
    async fn delete_token(&self, platform: &str, account: &str) -> GatewayResult<()>;
}

/// Process-local vault.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    tokens: DashMap<(String, String), TokenMetadata>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenVault for InMemoryVault {
    async fn get_token(
        &self,
        platform: &str,
        account: &str,
    ) -> GatewayResult<Option<TokenMetadata>> {
        Ok(self
            .tokens
            .get(&(platform.to_string(), account.to_string()))
            .map(|t| t.clone()))
    }

    async fn put_token(
        &self,
        platform: &str,
        account: &str,
        token: TokenMetadata,
    ) -> GatewayResult<()> {
        self.tokens
            .insert((platform.to_string(), account.to_string()), token);
        Ok(())
    }

    async fn delete_token(&self, platform: &str, account: &str) -> GatewayResult<()> {
        self.tokens
            .remove(&(platform.to_string(), account.to_string()))
            .map(|_| ())
            .ok_or_else(|| {
                GatewayError::Vault(format!("no token stored for {account} on {platform}"))
            })
    }
}

/// Mask a secret for logs, keeping only the last three characters.
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 3 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 3..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 3), visible)
}
