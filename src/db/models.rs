//! Database row types used by sqlx for typed fetches.

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub snapshot_date: String,
    pub mode: String,
    pub created_at: String,
    pub total_budget_cost: f64,
    pub total_budget_revenue: f64,
    pub total_actual_cost: f64,
    pub total_actual_revenue: f64,
    pub burn_pct: f64,
    pub gm_pct: f64,
    pub at_risk_count: i64,
    pub exception_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct JobRow {
    pub id: i64,
    pub snapshot_id: i64,
    pub job_id: i64,
    pub job_name: String,
    pub stage: String,
    pub budget_cost: f64,
    pub budget_revenue: f64,
    pub actual_cost: f64,
    pub actual_revenue: f64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub burn_pct: f64,
    pub gm_pct: f64,
    pub at_risk: i64,
    /// JSON array of exception strings.
    pub exceptions: String,
}
