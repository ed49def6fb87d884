use crate::error::{AppError, Result};
use crate::metrics::RiskPolicy;

/// Refresh the OAuth token this many seconds before its reported expiry.
pub const TOKEN_SAFETY_MARGIN_SECS: u64 = 60;

/// Request timeout for Simpro API calls (token + data).
pub const UPSTREAM_TIMEOUT_SECS: u64 = 15;

/// Request timeout for the Slack webhook POST.
pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Backoff schedule for retrying transient upstream failures during live ingest.
/// Auth failures are never retried.
pub const RETRY_BACKOFF_MS: &[u64] = &[500, 1000, 2000];

/// Page size for the Simpro jobs listing endpoint.
pub const JOBS_PAGE_SIZE: usize = 250;

/// Fallback at-risk policy when a job carries no schedule dates: flag once
/// burn exceeds this fraction of budget. A deliberate reporting policy,
/// tunable via AT_RISK_BURN_THRESHOLD.
pub const DEFAULT_BURN_THRESHOLD: f64 = 0.9;

/// How far burn may run ahead of schedule pace before a job is flagged
/// (AT_RISK_PACE_MARGIN).
pub const DEFAULT_PACE_MARGIN: f64 = 0.15;

#[derive(Debug, Clone)]
pub struct Config {
    /// Simpro tenant base URL, e.g. https://acme.simprosuite.com (SIMPRO_BASE_URL).
    /// Optional so the dashboard can run in demo mode without credentials.
    pub simpro_base_url: Option<String>,
    pub simpro_client_id: Option<String>,
    pub simpro_client_secret: Option<String>,
    /// Company scope for the jobs endpoint (SIMPRO_COMPANY_ID). When unset the
    /// first company visible to the credentials is used.
    pub simpro_company_id: Option<i64>,
    /// Slack incoming-webhook URL (SLACK_WEBHOOK_URL). Unset means share-to-Slack
    /// reports "not configured" rather than failing.
    pub slack_webhook_url: Option<String>,
    pub db_path: String,
    pub api_port: u16,
    pub log_level: String,
    pub risk: RiskPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            simpro_base_url: env_opt("SIMPRO_BASE_URL"),
            simpro_client_id: env_opt("SIMPRO_CLIENT_ID"),
            simpro_client_secret: env_opt("SIMPRO_CLIENT_SECRET"),
            simpro_company_id: env_parsed::<i64>("SIMPRO_COMPANY_ID")?,
            slack_webhook_url: env_opt("SLACK_WEBHOOK_URL"),
            db_path: env_opt("DB_PATH").unwrap_or_else(|| "eod.db".to_string()),
            api_port: env_parsed::<u16>("API_PORT")?.unwrap_or(8080),
            log_level: env_opt("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            risk: RiskPolicy {
                burn_threshold: env_parsed::<f64>("AT_RISK_BURN_THRESHOLD")?
                    .unwrap_or(DEFAULT_BURN_THRESHOLD),
                pace_margin: env_parsed::<f64>("AT_RISK_PACE_MARGIN")?
                    .unwrap_or(DEFAULT_PACE_MARGIN),
            },
        })
    }

    /// Returns (base_url, client_id, client_secret) when all three are set.
    pub fn simpro_credentials(&self) -> Option<(String, String, String)> {
        match (
            &self.simpro_base_url,
            &self.simpro_client_id,
            &self.simpro_client_secret,
        ) {
            (Some(base), Some(id), Some(secret)) => {
                Some((base.clone(), id.clone(), secret.clone()))
            }
            _ => None,
        }
    }
}

/// Read an env var, treating unset and whitespace-only as absent.
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an optional numeric env var. A set-but-unparsable value is a config
/// error, never a silent fallback to the default.
fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_opt(name) {
        Some(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {v:?}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so env mutation never races a parallel sibling.
    #[test]
    fn malformed_numeric_env_values_are_config_errors() {
        std::env::set_var("AT_RISK_BURN_THRESHOLD", "ninety");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            AppError::Config(_)
        ));
        std::env::remove_var("AT_RISK_BURN_THRESHOLD");

        std::env::set_var("SIMPRO_COMPANY_ID", "first");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            AppError::Config(_)
        ));
        std::env::remove_var("SIMPRO_COMPANY_ID");

        std::env::set_var("API_PORT", "http");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            AppError::Config(_)
        ));
        std::env::remove_var("API_PORT");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.risk.burn_threshold, DEFAULT_BURN_THRESHOLD);
        assert_eq!(cfg.risk.pace_margin, DEFAULT_PACE_MARGIN);
    }
}
