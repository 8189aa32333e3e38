use std::sync::{Arc, Mutex};

use league_core::Clock;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::criteria::Criteria;
use crate::db::{get_json, get_opt_ts, get_ts, ts_to_sql};
use crate::error::{Result, StoreError};
use crate::types::ScoredEntryPrediction;

const SCORED_SELECT_SQL: &str = "SELECT entry_prediction_id, standings_id, rankings, score,
        created_at, updated_at
     FROM scored_entry_prediction";

const SCORED_CRITERIA_COLUMNS: &[&str] = &["entry_prediction_id", "standings_id"];

fn row_to_scored(row: &Row<'_>) -> rusqlite::Result<ScoredEntryPrediction> {
    Ok(ScoredEntryPrediction {
        entry_prediction_id: row.get(0)?,
        standings_id: row.get(1)?,
        rankings: get_json(row, 2)?,
        score: row.get(3)?,
        created_at: get_ts(row, 4)?,
        updated_at: get_opt_ts(row, 5)?,
    })
}

/// Scored predictions, keyed by (entry_prediction_id, standings_id).
pub struct ScoredPredictionRepo {
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl ScoredPredictionRepo {
    pub fn new(db: Arc<Mutex<Connection>>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn insert(&self, mut scored: ScoredEntryPrediction) -> Result<ScoredEntryPrediction> {
        scored.created_at = self.clock.now();
        scored.updated_at = None;
        let rankings = serde_json::to_string(&scored.rankings)?;

        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO scored_entry_prediction
             (entry_prediction_id, standings_id, rankings, score, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            params![
                scored.entry_prediction_id,
                scored.standings_id,
                rankings,
                scored.score,
                ts_to_sql(scored.created_at),
            ],
        )?;
        Ok(scored)
    }

    /// Replace rankings and score for an existing key.
    pub fn update(&self, mut scored: ScoredEntryPrediction) -> Result<ScoredEntryPrediction> {
        let rankings = serde_json::to_string(&scored.rankings)?;
        let now = self.clock.now();

        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "UPDATE scored_entry_prediction SET rankings = ?3, score = ?4, updated_at = ?5
             WHERE entry_prediction_id = ?1 AND standings_id = ?2",
            params![
                scored.entry_prediction_id,
                scored.standings_id,
                rankings,
                scored.score,
                ts_to_sql(now),
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!(
                "scored prediction {}/{}",
                scored.entry_prediction_id, scored.standings_id
            )));
        }
        scored.updated_at = Some(now);
        Ok(scored)
    }

    pub fn select(&self, criteria: &Criteria, match_any: bool) -> Result<Vec<ScoredEntryPrediction>> {
        let (clause, values) = criteria.to_sql(SCORED_CRITERIA_COLUMNS, match_any)?;
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SCORED_SELECT_SQL}{clause} ORDER BY standings_id, score, entry_prediction_id"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_scored)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if rows.is_empty() {
            return Err(StoreError::NotFound("no scored predictions match criteria".into()));
        }
        Ok(rows)
    }

    pub fn exists_by_ids(&self, entry_prediction_id: &str, standings_id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.query_row(
            "SELECT 1 FROM scored_entry_prediction
             WHERE entry_prediction_id = ?1 AND standings_id = ?2",
            [entry_prediction_id, standings_id],
            |_| Ok(()),
        )
        .optional()?
        .ok_or_else(|| {
            StoreError::NotFound(format!(
                "scored prediction {entry_prediction_id}/{standings_id}"
            ))
        })
    }

    pub fn select_by_ids(
        &self,
        entry_prediction_id: &str,
        standings_id: &str,
    ) -> Result<ScoredEntryPrediction> {
        let conn = self.db.lock().unwrap();
        conn.query_row(
            &format!("{SCORED_SELECT_SQL} WHERE entry_prediction_id = ?1 AND standings_id = ?2"),
            [entry_prediction_id, standings_id],
            row_to_scored,
        )
        .optional()?
        .ok_or_else(|| {
            StoreError::NotFound(format!(
                "scored prediction {entry_prediction_id}/{standings_id}"
            ))
        })
    }

    /// Drop the entry's other scores against `standings_id`, leaving only the
    /// one for `kept_prediction_id`. Returns how many rows went.
    pub fn delete_superseded(
        &self,
        entry_id: &str,
        standings_id: &str,
        kept_prediction_id: &str,
    ) -> Result<usize> {
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM scored_entry_prediction
             WHERE standings_id = ?2
               AND entry_prediction_id != ?3
               AND entry_prediction_id IN (SELECT id FROM entry_prediction WHERE entry_id = ?1)",
            params![entry_id, standings_id, kept_prediction_id],
        )?;
        Ok(n)
    }

    /// Every score recorded against one snapshot, best first. Empty when the
    /// snapshot has not been scored.
    pub fn select_by_standings_id(&self, standings_id: &str) -> Result<Vec<ScoredEntryPrediction>> {
        match self.select(&Criteria::new().eq_str("standings_id", standings_id), false) {
            Err(StoreError::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }
}
