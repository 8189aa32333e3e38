use std::sync::{Arc, Mutex};

use league_core::Clock;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use crate::criteria::Criteria;
use crate::db::{get_json, get_opt_ts, get_ts, ts_to_sql};
use crate::error::{Result, StoreError};
use crate::types::Standings;

const STANDINGS_SELECT_SQL: &str = "SELECT id, season_id, round_number, rankings, finalised,
        created_at, updated_at
     FROM standings";

const STANDINGS_CRITERIA_COLUMNS: &[&str] = &["id", "season_id", "round_number", "finalised"];

fn row_to_standings(row: &Row<'_>) -> rusqlite::Result<Standings> {
    Ok(Standings {
        id: row.get(0)?,
        season_id: row.get(1)?,
        round_number: row.get(2)?,
        rankings: get_json(row, 3)?,
        finalised: row.get::<_, i64>(4)? != 0,
        created_at: get_ts(row, 5)?,
        updated_at: get_opt_ts(row, 6)?,
    })
}

pub struct StandingsRepo {
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl StandingsRepo {
    pub fn new(db: Arc<Mutex<Connection>>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Insert a new snapshot. A second snapshot for the same
    /// (season, round) is a `DuplicateRecord`.
    pub fn insert(&self, mut standings: Standings) -> Result<Standings> {
        if standings.id.is_empty() {
            standings.id = Uuid::now_v7().to_string();
        }
        standings.created_at = self.clock.now();
        standings.updated_at = None;
        let rankings = serde_json::to_string(&standings.rankings)?;

        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO standings
             (id, season_id, round_number, rankings, finalised, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            params![
                standings.id,
                standings.season_id,
                standings.round_number,
                rankings,
                standings.finalised as i64,
                ts_to_sql(standings.created_at),
            ],
        )?;
        debug!(
            standings_id = %standings.id,
            season_id = %standings.season_id,
            round = standings.round_number,
            "standings inserted"
        );
        Ok(standings)
    }

    /// Replace rankings in place. `finalised` can be raised but never
    /// cleared; the returned value reflects what is stored.
    pub fn update(&self, mut standings: Standings) -> Result<Standings> {
        let rankings = serde_json::to_string(&standings.rankings)?;
        let now = self.clock.now();

        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "UPDATE standings SET
                rankings = ?2,
                finalised = MAX(finalised, ?3),
                updated_at = ?4
             WHERE id = ?1",
            params![standings.id, rankings, standings.finalised as i64, ts_to_sql(now)],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("standings {}", standings.id)));
        }
        let finalised: i64 = conn.query_row(
            "SELECT finalised FROM standings WHERE id = ?1",
            [&standings.id],
            |r| r.get(0),
        )?;
        standings.finalised = finalised != 0;
        standings.updated_at = Some(now);
        Ok(standings)
    }

    pub fn select(&self, criteria: &Criteria, match_any: bool) -> Result<Vec<Standings>> {
        let (clause, values) = criteria.to_sql(STANDINGS_CRITERIA_COLUMNS, match_any)?;
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{STANDINGS_SELECT_SQL}{clause} ORDER BY season_id, round_number"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_standings)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if rows.is_empty() {
            return Err(StoreError::NotFound("no standings match criteria".into()));
        }
        Ok(rows)
    }

    pub fn exists_by_id(&self, id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.query_row("SELECT 1 FROM standings WHERE id = ?1", [id], |_| Ok(()))
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("standings {id}")))
    }

    pub fn select_by_season_and_round(&self, season_id: &str, round: u32) -> Result<Standings> {
        let conn = self.db.lock().unwrap();
        conn.query_row(
            &format!("{STANDINGS_SELECT_SQL} WHERE season_id = ?1 AND round_number = ?2"),
            params![season_id, round],
            row_to_standings,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("standings for {season_id} round {round}")))
    }
}
