use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use league_core::Clock;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::criteria::Criteria;
use crate::db::{get_json, get_ts, ts_to_sql};
use crate::error::{Result, StoreError};
use crate::types::EntryPrediction;

const PREDICTION_SELECT_SQL: &str =
    "SELECT id, entry_id, rankings, created_at FROM entry_prediction";

const PREDICTION_CRITERIA_COLUMNS: &[&str] = &["id", "entry_id"];

fn row_to_prediction(row: &Row<'_>) -> rusqlite::Result<EntryPrediction> {
    Ok(EntryPrediction {
        id: row.get(0)?,
        entry_id: row.get(1)?,
        rankings: get_json(row, 2)?,
        created_at: get_ts(row, 3)?,
    })
}

pub struct PredictionRepo {
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl PredictionRepo {
    pub fn new(db: Arc<Mutex<Connection>>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Predictions are append-only: every submission is a new row stamped
    /// with the current time.
    pub fn insert(&self, mut prediction: EntryPrediction) -> Result<EntryPrediction> {
        if prediction.rankings.is_empty() {
            return Err(StoreError::Validation("prediction has no rankings".into()));
        }
        if prediction.id.is_empty() {
            prediction.id = Uuid::now_v7().to_string();
        }
        prediction.created_at = self.clock.now();
        let rankings = serde_json::to_string(&prediction.rankings)?;

        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO entry_prediction (id, entry_id, rankings, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                prediction.id,
                prediction.entry_id,
                rankings,
                ts_to_sql(prediction.created_at)
            ],
        )?;
        Ok(prediction)
    }

    pub fn select(&self, criteria: &Criteria, match_any: bool) -> Result<Vec<EntryPrediction>> {
        let (clause, values) = criteria.to_sql(PREDICTION_CRITERIA_COLUMNS, match_any)?;
        let conn = self.db.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("{PREDICTION_SELECT_SQL}{clause} ORDER BY created_at, id"))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if rows.is_empty() {
            return Err(StoreError::NotFound("no predictions match criteria".into()));
        }
        Ok(rows)
    }

    pub fn exists_by_id(&self, id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.query_row("SELECT 1 FROM entry_prediction WHERE id = ?1", [id], |_| Ok(()))
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("prediction {id}")))
    }

    pub fn select_by_id(&self, id: &str) -> Result<EntryPrediction> {
        let conn = self.db.lock().unwrap();
        conn.query_row(
            &format!("{PREDICTION_SELECT_SQL} WHERE id = ?1"),
            [id],
            row_to_prediction,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("prediction {id}")))
    }

    /// The prediction that was in force for `entry_id` at `ts`: the latest
    /// one created at or before it.
    pub fn select_by_entry_id_and_timestamp(
        &self,
        entry_id: &str,
        ts: DateTime<Utc>,
    ) -> Result<EntryPrediction> {
        let conn = self.db.lock().unwrap();
        conn.query_row(
            &format!(
                "{PREDICTION_SELECT_SQL}
                 WHERE entry_id = ?1 AND created_at <= ?2
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1"
            ),
            params![entry_id, ts_to_sql(ts)],
            row_to_prediction,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("prediction for entry {entry_id} at {ts}")))
    }
}
