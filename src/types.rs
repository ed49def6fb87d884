use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Upstream entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

/// One project job as reported by Simpro, immutable within an ingest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub stage: String,
    pub budget_cost: f64,
    pub budget_revenue: f64,
    pub actual_cost: f64,
    pub actual_revenue: f64,
    /// Schedule dates when the tenant records them; drive pace-based at-risk.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Derived metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetrics {
    /// actual_cost / budget_cost, 0 when no budget is set.
    pub burn_pct: f64,
    /// (revenue - cost) / revenue, 0 when no revenue is recorded.
    pub gm_pct: f64,
    pub at_risk: bool,
    /// Human-readable data-quality and overrun flags.
    pub exceptions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job: Job,
    pub metrics: JobMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Totals {
    pub budget_cost: f64,
    pub budget_revenue: f64,
    pub actual_cost: f64,
    pub actual_revenue: f64,
    pub burn_pct: f64,
    pub gm_pct: f64,
    pub at_risk_count: i64,
    pub exception_count: i64,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    Demo,
    Live,
}

impl SnapshotMode {
    /// Lenient parse for values read back from the store. Anything
    /// unrecognized counts as demo data — a corrupt row must never be
    /// presented as a live result.
    pub fn parse(s: &str) -> Self {
        match s {
            "demo" => SnapshotMode::Demo,
            "live" => SnapshotMode::Live,
            other => {
                tracing::warn!("unknown snapshot mode {other:?} in store, treating as demo");
                SnapshotMode::Demo
            }
        }
    }
}

impl std::fmt::Display for SnapshotMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotMode::Demo => write!(f, "demo"),
            SnapshotMode::Live => write!(f, "live"),
        }
    }
}

/// The unit of persistence: one dated, immutable record of all job reports.
/// Re-ingesting on the same date inserts a new snapshot; the highest id for a
/// date is its canonical record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Row id once persisted; None before save.
    pub id: Option<i64>,
    /// Calendar day in the configured time zone, YYYY-MM-DD.
    pub date: String,
    pub mode: SnapshotMode,
    /// UTC RFC 3339 creation timestamp.
    pub created_at: String,
    pub jobs: Vec<JobReport>,
    pub totals: Totals,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_and_corrupt_values_fall_back_to_demo() {
        assert_eq!(SnapshotMode::parse("demo"), SnapshotMode::Demo);
        assert_eq!(SnapshotMode::parse("live"), SnapshotMode::Live);
        assert_eq!(SnapshotMode::parse("LIVE?"), SnapshotMode::Demo);
        assert_eq!(SnapshotMode::parse(""), SnapshotMode::Demo);
    }
}
