//! Simpro REST client: OAuth2 client-credentials token handling plus the
//! Companies and Jobs endpoints. The token lives in an owned, mutex-guarded
//! holder so concurrent callers never race a refresh.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{JOBS_PAGE_SIZE, TOKEN_SAFETY_MARGIN_SECS, UPSTREAM_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{Company, Job};

#[derive(Debug, Default)]
pub struct FetchStats {
    pub api_total: usize,
    pub rejected_no_id: usize,
    pub rejected_service: usize,
    pub rejected_inactive: usize,
    pub qualified: usize,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct SimproClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    company_id: Option<i64>,
    token: Mutex<Option<CachedToken>>,
}

impl SimproClient {
    pub fn new(
        base_url: String,
        client_id: String,
        client_secret: String,
        company_id: Option<i64>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            company_id,
            token: Mutex::new(None),
        })
    }

    pub fn company_id(&self) -> Option<i64> {
        self.company_id
    }

    /// Return a valid bearer token, requesting a fresh one when absent or
    /// inside the expiry safety margin. The mutex serializes the
    /// check-then-refresh so parallel ingests share one request.
    async fn ensure_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(tok) = guard.as_ref() {
            if tok.expires_at > Instant::now() {
                return Ok(tok.access_token.clone());
            }
        }

        info!("requesting Simpro access token");
        let url = format!("{}/oauth2/token", self.base_url);
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(net_err)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::Auth(format!("token endpoint returned {status}")));
        }
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: Value = resp.json().await.map_err(net_err)?;
        let access_token = body
            .get("access_token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| AppError::Auth("no access_token in token response".to_string()))?
            .to_string();
        let expires_in = body
            .get("expires_in")
            .and_then(|e| e.as_u64())
            .unwrap_or(3600);

        let ttl = expires_in.saturating_sub(TOKEN_SAFETY_MARGIN_SECS);
        *guard = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        });
        debug!("token cached for {ttl}s");
        Ok(access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Authenticated GET returning parsed JSON. A 401/403 on a cached token
    /// gets one transparent refresh-and-retry (the token may have been
    /// rotated mid-run); a second rejection is fatal.
    async fn get_json(&self, url: &str) -> Result<Value> {
        let token = self.ensure_token().await?;
        let mut resp = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(net_err)?;

        if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN {
            warn!("cached token rejected ({}), refreshing once", resp.status());
            self.invalidate_token().await;
            let token = self.ensure_token().await?;
            resp = self
                .http
                .get(url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(net_err)?;
        }

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::Auth(format!("upstream returned {status}")));
        }
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "upstream returned {status}"
            )));
        }
        resp.json().await.map_err(net_err)
    }

    pub async fn fetch_companies(&self) -> Result<Vec<Company>> {
        let url = format!("{}/api/v1.0/companies/", self.base_url);
        let resp = self.get_json(&url).await?;
        let items = resp.as_array().cloned().ok_or_else(|| {
            AppError::UpstreamUnavailable("companies response was not an array".to_string())
        })?;

        let companies = items
            .iter()
            .filter_map(|v| {
                Some(Company {
                    id: first_number(v, &["ID", "id"])? as i64,
                    name: first_text(v, &["Name", "name"]).unwrap_or_default(),
                })
            })
            .collect();
        Ok(companies)
    }

    /// Fetch active project jobs for a company, applying the stage/type
    /// filters. Pages until a short page is returned.
    pub async fn fetch_jobs(&self, company_id: i64) -> Result<(Vec<Job>, FetchStats)> {
        let mut jobs = Vec::new();
        let mut stats = FetchStats::default();
        let mut page = 1usize;

        loop {
            let url = format!(
                "{}/api/v1.0/companies/{}/jobs/?page={}&pageSize={}",
                self.base_url, company_id, page, JOBS_PAGE_SIZE
            );
            let resp = self.get_json(&url).await?;
            let items = resp.as_array().cloned().ok_or_else(|| {
                AppError::UpstreamUnavailable("jobs response was not an array".to_string())
            })?;

            if items.is_empty() {
                break;
            }
            stats.api_total += items.len();

            for item in &items {
                match parse_job_checked(item) {
                    Ok(job) => jobs.push(job),
                    Err(Rejection::NoId) => stats.rejected_no_id += 1,
                    Err(Rejection::ServiceJob) => stats.rejected_service += 1,
                    Err(Rejection::Inactive) => stats.rejected_inactive += 1,
                }
            }

            if items.len() < JOBS_PAGE_SIZE {
                break;
            }
            page += 1;
        }

        stats.qualified = jobs.len();
        Ok((jobs, stats))
    }
}

fn net_err(e: reqwest::Error) -> AppError {
    AppError::UpstreamUnavailable(e.to_string())
}

enum Rejection {
    NoId,
    ServiceJob,
    Inactive,
}

/// Parse one job object from the Simpro payload. Field names vary across
/// tenant versions, so every field is resolved from a candidate-key list.
fn parse_job_checked(v: &Value) -> std::result::Result<Job, Rejection> {
    let id = first_number(v, &["ID", "id", "jobId"]).ok_or(Rejection::NoId)? as i64;

    let job_type = first_text(v, &["Type", "type", "jobType"]).unwrap_or_default();
    if job_type.to_lowercase().contains("service") {
        return Err(Rejection::ServiceJob);
    }

    let stage = infer_stage(v);
    if !is_active_stage(&stage) {
        return Err(Rejection::Inactive);
    }

    let name = first_text(v, &["Name", "name", "jobName", "Description", "description"])
        .unwrap_or_else(|| format!("Job {id}"));

    Ok(Job {
        id,
        name,
        stage,
        budget_cost: first_number(
            v,
            &[
                "Total.Cost.Estimate",
                "estimatedCostExTax",
                "estimatedCost",
                "Totals.CostExTax",
            ],
        )
        .unwrap_or(0.0),
        budget_revenue: first_number(
            v,
            &[
                "Total.ExTax",
                "quotedPriceExTax",
                "contractPriceExTax",
                "Totals.ExTaxTotal",
            ],
        )
        .unwrap_or(0.0),
        actual_cost: first_number(
            v,
            &[
                "Total.Cost.Actual",
                "actualCostToDateExTax",
                "costToDate",
                "Totals.ActualCostExTax",
            ],
        )
        .unwrap_or(0.0),
        actual_revenue: first_number(
            v,
            &[
                "Total.InvoicedExTax",
                "revenueInvoicedToDate",
                "invoicedExTax",
                "Totals.InvoicedExTax",
            ],
        )
        .unwrap_or(0.0),
        start_date: first_date(v, &["DateIssued", "startDate", "dateIssued"]),
        end_date: first_date(v, &["DueDate", "endDate", "dueDate"]),
    })
}

fn infer_stage(v: &Value) -> String {
    first_text(v, &["Stage.Name", "Stage", "stage", "Status.Name", "status"])
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Keep pending / in-progress project jobs; drop complete and archived.
/// Unknown stages are treated as inactive.
fn is_active_stage(stage: &str) -> bool {
    let s = stage.to_lowercase();
    if s.contains("archiv") || s.contains("complete") {
        return false;
    }
    s.contains("pending") || s.contains("progress")
}

/// Resolve the first matching key (dot-separated keys descend into nested
/// objects) to a number, accepting numeric strings.
fn first_number(v: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        let Some(node) = lookup(v, key) else { continue };
        if let Some(n) = node.as_f64() {
            return Some(n);
        }
        if let Some(n) = node.as_str().and_then(|s| s.parse::<f64>().ok()) {
            return Some(n);
        }
    }
    None
}

fn first_text(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        let Some(node) = lookup(v, key) else { continue };
        if let Some(s) = node.as_str() {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

fn first_date(v: &Value, keys: &[&str]) -> Option<chrono::NaiveDate> {
    let text = first_text(v, keys)?;
    let day = text.get(..10)?;
    day.parse().ok()
}

fn lookup<'a>(v: &'a Value, key: &str) -> Option<&'a Value> {
    let mut node = v;
    for part in key.split('.') {
        node = node.get(part)?;
    }
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_job() -> Value {
        json!({
            "ID": 482,
            "Name": "Smith St fitout",
            "Stage": { "Name": "In Progress" },
            "Type": "Project",
            "Total": {
                "ExTax": 15000.0,
                "InvoicedExTax": "9000.00",
                "Cost": { "Estimate": 10000.0, "Actual": 12000.0 }
            },
            "DateIssued": "2025-05-01",
            "DueDate": "2025-07-31T00:00:00Z"
        })
    }

    #[test]
    fn parses_nested_totals_and_dates() {
        let job = parse_job_checked(&sample_job()).ok().unwrap();
        assert_eq!(job.id, 482);
        assert_eq!(job.name, "Smith St fitout");
        assert_eq!(job.budget_cost, 10000.0);
        assert_eq!(job.actual_cost, 12000.0);
        // numeric string accepted
        assert_eq!(job.actual_revenue, 9000.0);
        assert_eq!(job.start_date, Some("2025-05-01".parse().unwrap()));
        // timestamp truncated to the calendar day
        assert_eq!(job.end_date, Some("2025-07-31".parse().unwrap()));
    }

    #[test]
    fn rejects_service_and_completed_jobs() {
        let mut service = sample_job();
        service["Type"] = json!("Service");
        assert!(matches!(
            parse_job_checked(&service),
            Err(Rejection::ServiceJob)
        ));

        let mut done = sample_job();
        done["Stage"] = json!({ "Name": "Complete" });
        assert!(matches!(parse_job_checked(&done), Err(Rejection::Inactive)));

        let mut archived = sample_job();
        archived["Stage"] = json!("Archived");
        assert!(matches!(
            parse_job_checked(&archived),
            Err(Rejection::Inactive)
        ));
    }

    #[test]
    fn rejects_rows_without_an_id() {
        let v = json!({ "Name": "mystery row" });
        assert!(matches!(parse_job_checked(&v), Err(Rejection::NoId)));
    }

    #[test]
    fn unknown_stage_is_treated_as_inactive() {
        assert!(!is_active_stage("Unknown"));
        assert!(is_active_stage("Pending"));
        assert!(is_active_stage("work in progress"));
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_token_request() {
        use axum::{
            extract::State,
            routing::{get, post},
            Json, Router,
        };
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let token_hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/oauth2/token",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({ "access_token": "tok-1", "expires_in": 3600 }))
                }),
            )
            .route(
                "/api/v1.0/companies/",
                get(|| async { Json(serde_json::json!([{ "ID": 1, "Name": "Acme" }])) }),
            )
            .with_state(Arc::clone(&token_hits));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = SimproClient::new(
            format!("http://{addr}"),
            "id".to_string(),
            "secret".to_string(),
            None,
        )
        .unwrap();

        // Two simultaneous authenticated calls: the mutex around the token
        // holder must collapse them into a single grant request.
        let (a, b) = tokio::join!(client.fetch_companies(), client.fetch_companies());
        assert_eq!(a.unwrap().len(), 1);
        assert_eq!(b.unwrap().len(), 1);
        assert_eq!(token_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_number_falls_through_candidate_keys() {
        let v = json!({ "Totals": { "CostExTax": "123.5" } });
        assert_eq!(
            first_number(&v, &["Total.Cost.Estimate", "Totals.CostExTax"]),
            Some(123.5)
        );
        assert_eq!(first_number(&v, &["nope"]), None);
    }
}
