//! Reliability-probe scoring collaborator.
//!
//! Test-platform traffic is not delivered anywhere; it measures how long
//! an envelope took to traverse the relay. The probe's text form is
//! `start_time:id:msisdn` with `start_time` in unix seconds. A probe
//! counts as successful when it arrives within the configured window of
//! its start time.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;
use tracing::info;

/// A parsed reliability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTimes {
    pub start_time: DateTime<Utc>,
    pub test_id: String,
    pub msisdn: String,
}

impl ProbeTimes {
    /// Parse the `start_time:id:msisdn` probe form.
    pub fn parse(text: &str) -> GatewayResult<Self> {
        let mut parts = text.splitn(3, ':');
        let (Some(start), Some(test_id), Some(msisdn)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(GatewayError::Reliability(format!(
                "malformed probe, expected start_time:id:msisdn, got '{text}'"
            )));
        };
        let epoch: i64 = start.trim().parse().map_err(|_| {
            GatewayError::Reliability(format!("probe start time is not unix seconds: '{start}'"))
        })?;
        let start_time = Utc
            .timestamp_opt(epoch, 0)
            .single()
            .ok_or_else(|| GatewayError::Reliability(format!("probe start time out of range: {epoch}")))?;
        Ok(Self {
            start_time,
            test_id: test_id.trim().to_string(),
            msisdn: msisdn.trim().to_string(),
        })
    }
}

/// Records reliability-probe results.
#[async_trait]
pub trait ReliabilityScorer: Send + Sync {
    /// Record a probe and return a human-readable status line.
    async fn record_probe(&self, probe: ProbeTimes) -> GatewayResult<String>;
}

/// Default scorer: timestamp-delta check against a fixed success window.
#[derive(Debug, Clone)]
pub struct WindowScorer {
    window: Duration,
}

impl WindowScorer {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    fn verdict(&self, probe: &ProbeTimes, now: DateTime<Utc>) -> (bool, i64) {
        let elapsed = (now - probe.start_time).num_seconds();
        (elapsed >= 0 && elapsed as u64 <= self.window.as_secs(), elapsed)
    }
}

#[async_trait]
impl ReliabilityScorer for WindowScorer {
    async fn record_probe(&self, probe: ProbeTimes) -> GatewayResult<String> {
        let (passed, elapsed) = self.verdict(&probe, Utc::now());
        info!(
            test_id = %probe.test_id,
            msisdn = %probe.msisdn,
            elapsed_secs = elapsed,
            passed,
            "Reliability probe recorded"
        );
        if passed {
            Ok(format!(
                "reliability probe {} delivered in {elapsed}s",
                probe.test_id
            ))
        } else {
            Ok(format!(
                "reliability probe {} outside the {}s window ({elapsed}s)",
                probe.test_id,
                self.window.as_secs()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn parse_probe_form() {
        let probe = ProbeTimes::parse("1724572800:probe-7:+237650000001").unwrap();
        assert_eq!(probe.test_id, "probe-7");
        assert_eq!(probe.msisdn, "+237650000001");
        assert_eq!(probe.start_time.timestamp(), 1_724_572_800);
    }

    #[test]
    fn parse_rejects_bad_forms() {
        assert!(ProbeTimes::parse("only-two:parts").is_err());
        assert!(ProbeTimes::parse("not-a-number:id:+237").is_err());
    }

    #[test]
    fn window_verdict() {
        let scorer = WindowScorer::new(Duration::from_secs(180));
        let now = Utc::now();
        let fresh = ProbeTimes {
            start_time: now - ChronoDuration::seconds(60),
            test_id: "a".into(),
            msisdn: "+1".into(),
        };
        let late = ProbeTimes {
            start_time: now - ChronoDuration::seconds(400),
            test_id: "b".into(),
            msisdn: "+1".into(),
        };
        assert!(scorer.verdict(&fresh, now).0);
        assert!(!scorer.verdict(&late, now).0);
    }

    #[tokio::test]
    async fn record_reports_window_breach() {
        let scorer = WindowScorer::new(Duration::from_secs(180));
        let late = ProbeTimes {
            start_time: Utc::now() - ChronoDuration::seconds(400),
            test_id: "b".into(),
            msisdn: "+1".into(),
        };
        let status = scorer.record_probe(late).await.unwrap();
        assert!(status.contains("outside the 180s window"));
    }
}
