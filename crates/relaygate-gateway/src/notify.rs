//! Publication status notifications.
//!
//! Every dispatch, successful or not, is announced to a host-provided
//! notifier. The default just logs; hosts can fan the events out to
//! webhooks or queues.

use async_trait::async_trait;
use tracing::info;

/// Outcome category reported for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    Published,
    Failed,
}

impl std::fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Published => write!(f, "published"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Host hook for publication events. Must not block dispatch; failures
/// are the notifier's own problem.
#[async_trait]
pub trait PublicationNotifier: Send + Sync {
    async fn publish_status(
        &self,
        platform: &str,
        status: PublishStatus,
        country_code: Option<&str>,
        language: Option<&str>,
    );
}

/// Default notifier, logs each event.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl PublicationNotifier for LogNotifier {
    async fn publish_status(
        &self,
        platform: &str,
        status: PublishStatus,
        country_code: Option<&str>,
        language: Option<&str>,
    ) {
        info!(
            platform,
            %status,
            country_code = country_code.unwrap_or("-"),
            language = language.unwrap_or("-"),
            "Publication status"
        );
    }
}
