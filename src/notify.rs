//! Slack summary delivery. Sending is an explicit command with an explicit
//! outcome — an unconfigured webhook is a normal result, and delivery
//! failure never unwinds the snapshot that triggered it.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::WEBHOOK_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::types::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ShareOutcome {
    Sent,
    NotConfigured,
    Failed(String),
}

pub struct Notifier {
    http: reqwest::Client,
}

impl Notifier {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// POST a text digest of the snapshot to the webhook, if one is set.
    pub async fn send_summary(
        &self,
        webhook_url: Option<&str>,
        snapshot: &Snapshot,
    ) -> ShareOutcome {
        let Some(url) = webhook_url else {
            return ShareOutcome::NotConfigured;
        };

        let text = format_summary(snapshot);
        let payload = serde_json::json!({ "text": text });

        match self.http.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("summary for {} posted to Slack", snapshot.date);
                ShareOutcome::Sent
            }
            Ok(resp) => {
                let reason = format!("webhook returned {}", resp.status());
                warn!("Slack delivery failed: {reason}");
                ShareOutcome::Failed(reason)
            }
            Err(e) => {
                warn!("Slack delivery failed: {e}");
                ShareOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Short text digest: aggregate burn/GM, at-risk job names, exception count.
pub fn format_summary(snapshot: &Snapshot) -> String {
    let t = &snapshot.totals;
    let mut lines = vec![
        format!(
            "EOD {} snapshot for {} — {} jobs",
            snapshot.mode,
            snapshot.date,
            snapshot.jobs.len()
        ),
        format!(
            "Burn {} | GM {} | at risk {} | exceptions {}",
            fmt_pct(t.burn_pct),
            fmt_pct(t.gm_pct),
            t.at_risk_count,
            t.exception_count
        ),
    ];

    let at_risk: Vec<&str> = snapshot
        .jobs
        .iter()
        .filter(|r| r.metrics.at_risk)
        .map(|r| r.job.name.as_str())
        .collect();
    if !at_risk.is_empty() {
        lines.push(format!("At risk: {}", at_risk.join(", ")));
    }

    lines.join("\n")
}

pub fn fmt_pct(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}
