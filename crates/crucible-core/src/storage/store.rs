use crate::model::{
    Classification, DashboardMetrics, ResultStatus, RunConfig, RunStatus, RunSummary, TestResult,
    TestRun,
};
use crate::storage::RunSink;
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    fn upsert_run(&self, run: &TestRun) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        // completed_at is written once: an existing value always wins
        conn.execute(
            "INSERT INTO runs(id, name, model, status, config_json, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                completed_at = COALESCE(runs.completed_at, excluded.completed_at)",
            params![
                run.id,
                run.name,
                run.config.model,
                run.status.as_str(),
                serde_json::to_string(&run.config)?,
                run.created_at.to_rfc3339(),
                run.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn insert_result(&self, r: &TestResult) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO results(run_id, test_case_id, model_name, status, classification,
                                 raw_response, error, latency_ms, attempt_count, flag_count,
                                 flags_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                r.run_id,
                r.test_case_id,
                r.model_name,
                r.status.as_str(),
                r.classification.as_str(),
                r.raw_response,
                r.error,
                r.latency_ms as i64,
                r.attempt_count as i64,
                r.vulnerability_flags.len() as i64,
                serde_json::to_string(&r.vulnerability_flags)?,
                r.timestamp.to_rfc3339(),
            ],
        )
        .context("insert result")?;
        Ok(())
    }

    pub fn get_run(&self, id: &str) -> anyhow::Result<Option<TestRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, status, config_json, created_at, completed_at
             FROM runs WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            let config_json: Option<String> = row.get(3)?;
            let config: RunConfig = config_json
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default();
            let created_at: String = row.get(4)?;
            let completed_at: Option<String> = row.get(5)?;
            Ok(Some(TestRun {
                id: row.get(0)?,
                name: row.get(1)?,
                status: RunStatus::parse(&row.get::<_, String>(2)?),
                config,
                created_at: parse_ts(&created_at),
                completed_at: completed_at.as_deref().map(parse_ts),
            }))
        } else {
            Ok(None)
        }
    }

    pub fn results_for_run(&self, run_id: &str) -> anyhow::Result<Vec<TestResult>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT run_id, test_case_id, model_name, status, classification, raw_response,
                    error, latency_ms, attempt_count, flags_json, created_at
             FROM results WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let flags_json: Option<String> = row.get(9)?;
            let created_at: String = row.get(10)?;
            Ok(TestResult {
                run_id: row.get(0)?,
                test_case_id: row.get(1)?,
                model_name: row.get(2)?,
                status: ResultStatus::parse(&row.get::<_, String>(3)?),
                classification: Classification::parse(&row.get::<_, String>(4)?),
                raw_response: row.get(5)?,
                error: row.get(6)?,
                latency_ms: row.get::<_, i64>(7)? as u64,
                attempt_count: row.get::<_, i64>(8)? as u32,
                vulnerability_flags: flags_json
                    .as_deref()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or_default(),
                timestamp: parse_ts(&created_at),
            })
        })?;

        let mut results = Vec::new();
        for r in rows {
            results.push(r?);
        }
        Ok(results)
    }

    pub fn run_summary(&self, run_id: &str) -> anyhow::Result<Option<RunSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.name, r.status, r.created_at,
                    COUNT(res.id),
                    AVG(CASE WHEN res.classification = 'success' THEN 100.0 ELSE 0.0 END),
                    AVG(res.latency_ms)
             FROM runs r LEFT JOIN results res ON res.run_id = r.id
             WHERE r.id = ?1
             GROUP BY r.id",
        )?;
        let mut rows = stmt.query(params![run_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(summary_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn recent_runs(&self, limit: u32) -> anyhow::Result<Vec<RunSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.name, r.status, r.created_at,
                    COUNT(res.id),
                    AVG(CASE WHEN res.classification = 'success' THEN 100.0 ELSE 0.0 END),
                    AVG(res.latency_ms)
             FROM runs r LEFT JOIN results res ON res.run_id = r.id
             GROUP BY r.id
             ORDER BY r.created_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<f64>>(5)?,
                row.get::<_, Option<f64>>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for r in rows {
            let (id, name, status, created_at, total, rate, latency) = r?;
            out.push(RunSummary {
                id,
                name,
                status: RunStatus::parse(&status),
                created_at,
                total_cases: total as u64,
                success_rate: rate.unwrap_or(0.0),
                average_latency: latency.unwrap_or(0.0),
            });
        }
        Ok(out)
    }

    /// Aggregated metrics across every stored run (dashboard contract).
    pub fn dashboard_metrics(&self) -> anyhow::Result<DashboardMetrics> {
        let (total, rate, latency, vulns) = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT COUNT(*),
                        AVG(CASE WHEN classification = 'success' THEN 100.0 ELSE 0.0 END),
                        AVG(latency_ms),
                        COALESCE(SUM(flag_count), 0)
                 FROM results",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )?
        };
        let last_run = self.recent_runs(1)?.into_iter().next();
        Ok(DashboardMetrics {
            total_test_cases: total as u64,
            success_rate: rate.unwrap_or(0.0),
            average_latency: latency.unwrap_or(0.0),
            total_vulnerabilities: vulns as u64,
            last_run,
        })
    }

    /// Deletes runs (and their results) created more than `days` ago.
    /// Returns the number of pruned runs.
    pub fn prune_runs_older_than(&self, days: i64) -> anyhow::Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM results WHERE run_id IN (SELECT id FROM runs WHERE created_at < ?1)",
            params![cutoff],
        )?;
        let pruned = conn.execute("DELETE FROM runs WHERE created_at < ?1", params![cutoff])?;
        Ok(pruned)
    }
}

impl RunSink for Store {
    fn save_result(&self, result: &TestResult) -> anyhow::Result<()> {
        self.insert_result(result)
    }

    fn update_run(&self, run: &TestRun) -> anyhow::Result<()> {
        self.upsert_run(run)
    }
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> anyhow::Result<RunSummary> {
    Ok(RunSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        status: RunStatus::parse(&row.get::<_, String>(2)?),
        created_at: row.get(3)?,
        total_cases: row.get::<_, i64>(4)? as u64,
        success_rate: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
        average_latency: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
