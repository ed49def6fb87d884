//! Ingest orchestration: pull jobs (demo or live), derive metrics, persist
//! one snapshot. Fatal upstream/storage errors abort the run before anything
//! is written — a failed ingest never leaves a partial snapshot behind.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Local, NaiveDate, Utc};
use tracing::{info, warn};

use crate::config::RETRY_BACKOFF_MS;
use crate::db::SnapshotStore;
use crate::error::{AppError, Result};
use crate::metrics::{self, RiskPolicy};
use crate::simpro::SimproClient;
use crate::types::{Job, Snapshot, SnapshotMode};

pub async fn run_ingest(
    mode: SnapshotMode,
    client: Option<&SimproClient>,
    store: &SnapshotStore,
    policy: &RiskPolicy,
) -> Result<Snapshot> {
    let date = Local::now().date_naive();

    let jobs = match mode {
        SnapshotMode::Demo => demo_jobs(date),
        SnapshotMode::Live => {
            let client = client.ok_or_else(|| {
                AppError::Config(
                    "live ingest requires SIMPRO_BASE_URL, SIMPRO_CLIENT_ID and SIMPRO_CLIENT_SECRET"
                        .to_string(),
                )
            })?;
            fetch_live_jobs(client).await?
        }
    };

    let (reports, totals) = metrics::compute(&jobs, policy, date);
    let snapshot = Snapshot {
        id: None,
        date: date.to_string(),
        mode,
        created_at: Utc::now().to_rfc3339(),
        jobs: reports,
        totals,
    };

    let id = store.save(&snapshot).await?;
    info!(
        "{mode} ingest complete: snapshot {id} for {} ({} jobs, {} at risk, {} exceptions)",
        snapshot.date,
        snapshot.jobs.len(),
        snapshot.totals.at_risk_count,
        snapshot.totals.exception_count,
    );

    Ok(Snapshot {
        id: Some(id),
        ..snapshot
    })
}

/// Live fetch with bounded retry. Only transient upstream failures are
/// retried; auth rejections surface immediately so the operator sees them.
async fn fetch_live_jobs(client: &SimproClient) -> Result<Vec<Job>> {
    let mut attempt = 0usize;
    loop {
        match fetch_once(client).await {
            Ok(jobs) => return Ok(jobs),
            Err(AppError::UpstreamUnavailable(reason)) if attempt < RETRY_BACKOFF_MS.len() => {
                let backoff = RETRY_BACKOFF_MS[attempt];
                warn!(
                    "upstream unavailable ({reason}), retry {}/{} in {backoff}ms",
                    attempt + 1,
                    RETRY_BACKOFF_MS.len(),
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fetch_once(client: &SimproClient) -> Result<Vec<Job>> {
    let company_id = match client.company_id() {
        Some(cid) => cid,
        None => {
            let companies = client.fetch_companies().await?;
            let first = companies.first().ok_or_else(|| {
                AppError::UpstreamUnavailable("no companies visible to these credentials".to_string())
            })?;
            info!("no company configured, using \"{}\" ({})", first.name, first.id);
            first.id
        }
    };

    let (jobs, stats) = client.fetch_jobs(company_id).await?;
    info!(
        "fetched {} active project jobs from {} API rows (rejected: no_id={} service={} inactive={})",
        stats.qualified, stats.api_total, stats.rejected_no_id, stats.rejected_service,
        stats.rejected_inactive,
    );
    Ok(jobs)
}

/// Fixed sample set covering the interesting shapes: healthy, over budget,
/// no budget, no revenue, and a scheduled job burning ahead of pace. Demo
/// ingest never touches the network.
pub fn demo_jobs(as_of: NaiveDate) -> Vec<Job> {
    vec![
        Job {
            id: 101,
            name: "Depot rewire".to_string(),
            stage: "In Progress".to_string(),
            budget_cost: 42000.0,
            budget_revenue: 61000.0,
            actual_cost: 23500.0,
            actual_revenue: 30500.0,
            start_date: Some(as_of - ChronoDuration::days(40)),
            end_date: Some(as_of + ChronoDuration::days(30)),
        },
        Job {
            id: 102,
            name: "Smith St fitout".to_string(),
            stage: "In Progress".to_string(),
            budget_cost: 18000.0,
            budget_revenue: 26000.0,
            actual_cost: 21600.0,
            actual_revenue: 15000.0,
            start_date: None,
            end_date: None,
        },
        Job {
            id: 103,
            name: "Warehouse lighting upgrade".to_string(),
            stage: "Pending".to_string(),
            budget_cost: 0.0,
            budget_revenue: 9500.0,
            actual_cost: 1200.0,
            actual_revenue: 0.0,
            start_date: None,
            end_date: None,
        },
        Job {
            id: 104,
            name: "Civic centre switchboards".to_string(),
            stage: "In Progress".to_string(),
            budget_cost: 75000.0,
            budget_revenue: 104000.0,
            actual_cost: 39000.0,
            actual_revenue: 0.0,
            start_date: Some(as_of - ChronoDuration::days(10)),
            end_date: Some(as_of + ChronoDuration::days(80)),
        },
        Job {
            id: 105,
            name: "Harbour kiosk solar".to_string(),
            stage: "In Progress".to_string(),
            budget_cost: 12500.0,
            budget_revenue: 17800.0,
            actual_cost: 6100.0,
            actual_revenue: 8900.0,
            start_date: Some(as_of - ChronoDuration::days(20)),
            end_date: Some(as_of + ChronoDuration::days(10)),
        },
    ]
}
