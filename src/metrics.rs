//! Pure metric derivation — no I/O, inputs are never mutated.

use chrono::NaiveDate;

use crate::config::{DEFAULT_BURN_THRESHOLD, DEFAULT_PACE_MARGIN};
use crate::types::{Job, JobMetrics, JobReport, Totals};

pub const EXC_NO_BUDGET: &str = "no budget set";
pub const EXC_NO_REVENUE: &str = "no revenue recorded";
pub const EXC_OVER_BUDGET: &str = "over budget";

#[derive(Debug, Clone, Copy)]
pub struct RiskPolicy {
    /// Fallback threshold when a job has no usable schedule dates.
    pub burn_threshold: f64,
    /// Allowed burn-ahead-of-pace before flagging a scheduled job.
    pub pace_margin: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            burn_threshold: DEFAULT_BURN_THRESHOLD,
            pace_margin: DEFAULT_PACE_MARGIN,
        }
    }
}

/// Compute per-job metrics and aggregate totals for one snapshot.
/// `as_of` is the snapshot calendar day, passed in so this stays clock-free.
pub fn compute(jobs: &[Job], policy: &RiskPolicy, as_of: NaiveDate) -> (Vec<JobReport>, Totals) {
    let mut reports = Vec::with_capacity(jobs.len());
    let mut totals = Totals::default();

    for job in jobs {
        let metrics = compute_job(job, policy, as_of);

        totals.budget_cost += job.budget_cost;
        totals.budget_revenue += job.budget_revenue;
        totals.actual_cost += job.actual_cost;
        totals.actual_revenue += job.actual_revenue;
        if metrics.at_risk {
            totals.at_risk_count += 1;
        }
        totals.exception_count += metrics.exceptions.len() as i64;

        reports.push(JobReport {
            job: job.clone(),
            metrics,
        });
    }

    // Aggregate ratios carry the same zero-guards as per-job figures. Jobs
    // with no budget contribute nothing to the denominator.
    if totals.budget_cost > 0.0 {
        totals.burn_pct = totals.actual_cost / totals.budget_cost;
    }
    if totals.actual_revenue > 0.0 {
        totals.gm_pct = (totals.actual_revenue - totals.actual_cost) / totals.actual_revenue;
    }

    (reports, totals)
}

fn compute_job(job: &Job, policy: &RiskPolicy, as_of: NaiveDate) -> JobMetrics {
    let mut exceptions = Vec::new();

    let burn_pct = if job.budget_cost > 0.0 {
        job.actual_cost / job.budget_cost
    } else {
        exceptions.push(EXC_NO_BUDGET.to_string());
        0.0
    };

    let gm_pct = if job.actual_revenue > 0.0 {
        (job.actual_revenue - job.actual_cost) / job.actual_revenue
    } else {
        exceptions.push(EXC_NO_REVENUE.to_string());
        0.0
    };

    if burn_pct > 1.0 {
        exceptions.push(EXC_OVER_BUDGET.to_string());
    }

    // At-risk: compare burn to schedule pace when dates exist; otherwise fall
    // back to the flat burn threshold (documented policy, not missing-data
    // coincidence).
    let at_risk = match expected_pace(job, as_of) {
        Some(pace) => burn_pct - pace > policy.pace_margin,
        None => burn_pct > policy.burn_threshold,
    };

    JobMetrics {
        burn_pct,
        gm_pct,
        at_risk,
        exceptions,
    }
}

/// Fraction of the schedule elapsed as of the snapshot day, clamped to [0, 1].
/// None when the job has no usable date span.
fn expected_pace(job: &Job, as_of: NaiveDate) -> Option<f64> {
    let start = job.start_date?;
    let end = job.end_date?;
    let total_days = (end - start).num_days();
    if total_days < 1 {
        return None;
    }
    let elapsed_days = (as_of - start).num_days();
    Some((elapsed_days as f64 / total_days as f64).clamp(0.0, 1.0))
}
