//! Insert-only snapshot persistence. New ingest runs always insert; the
//! canonical snapshot for a date is the one with the highest id, so EOD
//! numbers stay stable against later re-runs while full history is kept.

use sqlx::SqlitePool;

use crate::db::models::{JobRow, SnapshotRow};
use crate::error::Result;
use crate::types::{Job, JobMetrics, JobReport, Snapshot, SnapshotMode, Totals};

const SCHEMA: &str = r#"
PRAGMA journal_mode=WAL;

CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_date TEXT NOT NULL,
    mode TEXT NOT NULL,
    created_at TEXT NOT NULL,
    total_budget_cost REAL NOT NULL,
    total_budget_revenue REAL NOT NULL,
    total_actual_cost REAL NOT NULL,
    total_actual_revenue REAL NOT NULL,
    burn_pct REAL NOT NULL,
    gm_pct REAL NOT NULL,
    at_risk_count INTEGER NOT NULL,
    exception_count INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshot_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id INTEGER NOT NULL,
    job_id INTEGER NOT NULL,
    job_name TEXT NOT NULL,
    stage TEXT NOT NULL,
    budget_cost REAL NOT NULL,
    budget_revenue REAL NOT NULL,
    actual_cost REAL NOT NULL,
    actual_revenue REAL NOT NULL,
    start_date TEXT,
    end_date TEXT,
    burn_pct REAL NOT NULL,
    gm_pct REAL NOT NULL,
    at_risk INTEGER NOT NULL,
    exceptions TEXT NOT NULL,
    FOREIGN KEY(snapshot_id) REFERENCES snapshots(id)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_date ON snapshots(snapshot_date);
CREATE INDEX IF NOT EXISTS idx_snapshot_jobs_snapshot ON snapshot_jobs(snapshot_id);
"#;

#[derive(Clone)]
pub struct SnapshotStore {
    pool: SqlitePool,
}

impl SnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Persist one snapshot and its job rows in a single transaction.
    /// Returns the new snapshot id.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let t = &snapshot.totals;
        let snapshot_id = sqlx::query(
            r#"
            INSERT INTO snapshots (
                snapshot_date, mode, created_at,
                total_budget_cost, total_budget_revenue,
                total_actual_cost, total_actual_revenue,
                burn_pct, gm_pct, at_risk_count, exception_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.date)
        .bind(snapshot.mode.to_string())
        .bind(&snapshot.created_at)
        .bind(t.budget_cost)
        .bind(t.budget_revenue)
        .bind(t.actual_cost)
        .bind(t.actual_revenue)
        .bind(t.burn_pct)
        .bind(t.gm_pct)
        .bind(t.at_risk_count)
        .bind(t.exception_count)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for report in &snapshot.jobs {
            let job = &report.job;
            let m = &report.metrics;
            sqlx::query(
                r#"
                INSERT INTO snapshot_jobs (
                    snapshot_id, job_id, job_name, stage,
                    budget_cost, budget_revenue, actual_cost, actual_revenue,
                    start_date, end_date, burn_pct, gm_pct, at_risk, exceptions
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(snapshot_id)
            .bind(job.id)
            .bind(&job.name)
            .bind(&job.stage)
            .bind(job.budget_cost)
            .bind(job.budget_revenue)
            .bind(job.actual_cost)
            .bind(job.actual_revenue)
            .bind(job.start_date.map(|d| d.to_string()))
            .bind(job.end_date.map(|d| d.to_string()))
            .bind(m.burn_pct)
            .bind(m.gm_pct)
            .bind(i64::from(m.at_risk))
            .bind(serde_json::to_string(&m.exceptions)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(snapshot_id)
    }

    pub async fn get_latest(&self) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM snapshots ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load(row).await?)),
            None => Ok(None),
        }
    }

    /// Canonical snapshot for a calendar date: the most recently inserted one.
    pub async fn get_by_date(&self, date: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM snapshots WHERE snapshot_date = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load(row).await?)),
            None => Ok(None),
        }
    }

    /// Distinct snapshot dates, most recent first.
    pub async fn list_dates(&self) -> Result<Vec<String>> {
        let dates = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT snapshot_date FROM snapshots ORDER BY snapshot_date DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(dates)
    }

    async fn load(&self, row: SnapshotRow) -> Result<Snapshot> {
        let job_rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM snapshot_jobs WHERE snapshot_id = ? ORDER BY id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let jobs = job_rows
            .into_iter()
            .map(|r| JobReport {
                job: Job {
                    id: r.job_id,
                    name: r.job_name,
                    stage: r.stage,
                    budget_cost: r.budget_cost,
                    budget_revenue: r.budget_revenue,
                    actual_cost: r.actual_cost,
                    actual_revenue: r.actual_revenue,
                    start_date: r.start_date.and_then(|d| d.parse().ok()),
                    end_date: r.end_date.and_then(|d| d.parse().ok()),
                },
                metrics: JobMetrics {
                    burn_pct: r.burn_pct,
                    gm_pct: r.gm_pct,
                    at_risk: r.at_risk != 0,
                    exceptions: serde_json::from_str(&r.exceptions).unwrap_or_default(),
                },
            })
            .collect();

        Ok(Snapshot {
            id: Some(row.id),
            date: row.snapshot_date,
            mode: SnapshotMode::parse(&row.mode),
            created_at: row.created_at,
            jobs,
            totals: Totals {
                budget_cost: row.total_budget_cost,
                budget_revenue: row.total_budget_revenue,
                actual_cost: row.total_actual_cost,
                actual_revenue: row.total_actual_revenue,
                burn_pct: row.burn_pct,
                gm_pct: row.gm_pct,
                at_risk_count: row.at_risk_count,
                exception_count: row.exception_count,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn mem_store() -> SnapshotStore {
        // Single connection so every query sees the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SnapshotStore::new(pool);
        store.init().await.unwrap();
        store
    }

    fn snapshot(date: &str, job_name: &str) -> Snapshot {
        Snapshot {
            id: None,
            date: date.to_string(),
            mode: SnapshotMode::Demo,
            created_at: "2025-06-02T22:00:00Z".to_string(),
            jobs: vec![JobReport {
                job: Job {
                    id: 1,
                    name: job_name.to_string(),
                    stage: "In Progress".to_string(),
                    budget_cost: 1000.0,
                    budget_revenue: 1500.0,
                    actual_cost: 1200.0,
                    actual_revenue: 900.0,
                    start_date: Some("2025-05-01".parse().unwrap()),
                    end_date: None,
                },
                metrics: JobMetrics {
                    burn_pct: 1.2,
                    gm_pct: -1.0 / 3.0,
                    at_risk: true,
                    exceptions: vec!["over budget".to_string()],
                },
            }],
            totals: Totals {
                budget_cost: 1000.0,
                actual_cost: 1200.0,
                burn_pct: 1.2,
                at_risk_count: 1,
                exception_count: 1,
                ..Totals::default()
            },
        }
    }

    #[tokio::test]
    async fn save_then_get_latest_round_trips() {
        let store = mem_store().await;
        let id = store.save(&snapshot("2025-06-02", "Smith St fitout")).await.unwrap();

        let loaded = store.get_latest().await.unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.date, "2025-06-02");
        assert_eq!(loaded.mode, SnapshotMode::Demo);
        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.jobs[0].job.name, "Smith St fitout");
        assert_eq!(loaded.jobs[0].job.start_date, Some("2025-05-01".parse().unwrap()));
        assert!(loaded.jobs[0].metrics.at_risk);
        assert_eq!(loaded.jobs[0].metrics.exceptions, vec!["over budget"]);
        assert_eq!(loaded.totals.at_risk_count, 1);
    }

    #[tokio::test]
    async fn second_save_same_date_wins_but_first_survives() {
        let store = mem_store().await;
        let first = store.save(&snapshot("2025-06-02", "first run")).await.unwrap();
        let second = store.save(&snapshot("2025-06-02", "second run")).await.unwrap();
        assert!(second > first);

        let latest = store.get_latest().await.unwrap().unwrap();
        assert_eq!(latest.id, Some(second));
        assert_eq!(latest.jobs[0].job.name, "second run");

        let by_date = store.get_by_date("2025-06-02").await.unwrap().unwrap();
        assert_eq!(by_date.id, Some(second));

        // history is append-only: one date, two snapshot rows, and the first
        // run's row is still intact — an upsert would have clobbered it
        assert_eq!(store.list_dates().await.unwrap(), vec!["2025-06-02"]);
        let rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM snapshots WHERE snapshot_date = ?")
                .bind("2025-06-02")
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(rows, 2);
        let first_name: String = sqlx::query_scalar(
            "SELECT job_name FROM snapshot_jobs WHERE snapshot_id = ?",
        )
        .bind(first)
        .fetch_one(&store.pool)
        .await
        .unwrap();
        assert_eq!(first_name, "first run");
    }

    #[tokio::test]
    async fn list_dates_is_distinct_and_descending() {
        let store = mem_store().await;
        store.save(&snapshot("2025-06-01", "a")).await.unwrap();
        store.save(&snapshot("2025-06-03", "b")).await.unwrap();
        store.save(&snapshot("2025-06-02", "c")).await.unwrap();
        store.save(&snapshot("2025-06-03", "d")).await.unwrap();

        assert_eq!(
            store.list_dates().await.unwrap(),
            vec!["2025-06-03", "2025-06-02", "2025-06-01"]
        );
    }

    #[tokio::test]
    async fn empty_store_has_no_latest() {
        let store = mem_store().await;
        assert!(store.get_latest().await.unwrap().is_none());
        assert!(store.get_by_date("2025-06-02").await.unwrap().is_none());
        assert!(store.list_dates().await.unwrap().is_empty());
    }
}
