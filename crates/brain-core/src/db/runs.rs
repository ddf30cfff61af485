//! Evolution run history

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::evolution::{EvolutionReason, EvolutionResult};
use crate::models::EvolutionRun;

impl Database {
    /// Record the outcome of one evolve call
    pub fn record_evolution_run(&self, result: &EvolutionResult) -> Result<i64> {
        let conn = self.conn()?;
        let fingerprint = result
            .snapshot
            .as_ref()
            .map(|s| s.data_fingerprint.as_str())
            .filter(|f| !f.is_empty());

        conn.execute(
            r#"
            INSERT INTO evolution_runs
                (reason, trained, epochs_run, sample_count, months_analyzed, average_loss, fingerprint)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                result.reason.as_str(),
                result.trained,
                result.epochs_run as i64,
                result.sample_count as i64,
                result.months_analyzed as i64,
                result.average_loss,
                fingerprint,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Most recent runs first
    pub fn list_evolution_runs(&self, limit: usize) -> Result<Vec<EvolutionRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, reason, trained, epochs_run, sample_count, months_analyzed,
                   average_loss, fingerprint, created_at
            FROM evolution_runs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )?;

        let runs = stmt
            .query_map(params![limit as i64], |row| {
                let reason_str: String = row.get(1)?;
                let created_at_str: String = row.get(8)?;
                let epochs_run: i64 = row.get(3)?;
                let sample_count: i64 = row.get(4)?;
                let months_analyzed: i64 = row.get(5)?;

                Ok(EvolutionRun {
                    id: row.get(0)?,
                    reason: reason_str
                        .parse()
                        .unwrap_or(EvolutionReason::InsufficientData),
                    trained: row.get(2)?,
                    epochs_run: epochs_run.max(0) as u32,
                    sample_count: sample_count.max(0) as usize,
                    months_analyzed: months_analyzed.max(0) as usize,
                    average_loss: row.get(6)?,
                    fingerprint: row.get(7)?,
                    created_at: parse_datetime(&created_at_str),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }
}
