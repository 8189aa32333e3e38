use std::sync::{Arc, Mutex};

use league_core::Clock;
use rusqlite::{params, params_from_iter, types::Type, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use crate::criteria::Criteria;
use crate::db::{get_opt_ts, get_ts, opt_ts_to_sql, ts_to_sql};
use crate::error::{Result, StoreError};
use crate::types::{Entry, EntryStatus};

const ENTRY_SELECT_SQL: &str = "SELECT id, short_code, season_id, realm_name, entrant_name,
        entrant_nickname, entrant_email, status, payment_method, payment_ref,
        approved_at, created_at, updated_at
     FROM entry";

const ENTRY_CRITERIA_COLUMNS: &[&str] = &[
    "id",
    "short_code",
    "season_id",
    "realm_name",
    "entrant_email",
    "status",
    "payment_method",
    "approved_at",
];

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let parse_err = |idx: usize, e: StoreError| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    };
    let status: String = row.get(7)?;
    let payment_method: Option<String> = row.get(8)?;
    Ok(Entry {
        id: row.get(0)?,
        short_code: row.get(1)?,
        season_id: row.get(2)?,
        realm_name: row.get(3)?,
        entrant_name: row.get(4)?,
        entrant_nickname: row.get(5)?,
        entrant_email: row.get(6)?,
        status: status.parse().map_err(|e| parse_err(7, e))?,
        payment_method: payment_method
            .map(|m| m.parse())
            .transpose()
            .map_err(|e| parse_err(8, e))?,
        payment_ref: row.get(9)?,
        approved_at: get_opt_ts(row, 10)?,
        created_at: get_ts(row, 11)?,
        updated_at: get_opt_ts(row, 12)?,
    })
}

/// Entries are written by the registration flow; the pipeline only reads
/// them, but the full surface lives here so every writer shares the checks.
pub struct EntryRepo {
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl EntryRepo {
    pub fn new(db: Arc<Mutex<Connection>>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Validate and insert. Assigns an id when none is given and stamps
    /// `created_at`; `updated_at` starts empty.
    pub fn insert(&self, mut entry: Entry) -> Result<Entry> {
        entry.validate()?;
        if entry.id.is_empty() {
            entry.id = Uuid::now_v7().to_string();
        }
        entry.created_at = self.clock.now();
        entry.updated_at = None;

        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO entry
             (id, short_code, season_id, realm_name, entrant_name, entrant_nickname,
              entrant_email, status, payment_method, payment_ref, approved_at,
              created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,NULL)",
            params![
                entry.id,
                entry.short_code,
                entry.season_id,
                entry.realm_name,
                entry.entrant_name,
                entry.entrant_nickname,
                entry.entrant_email,
                entry.status.to_string(),
                entry.payment_method.map(|m| m.to_string()),
                entry.payment_ref,
                opt_ts_to_sql(entry.approved_at),
                ts_to_sql(entry.created_at),
            ],
        )?;
        debug!(entry_id = %entry.id, season_id = %entry.season_id, "entry inserted");
        Ok(entry)
    }

    /// Persist all mutable fields. The status may only move forward.
    pub fn update(&self, mut entry: Entry) -> Result<Entry> {
        entry.validate()?;
        let conn = self.db.lock().unwrap();

        let current: Option<String> = conn
            .query_row("SELECT status FROM entry WHERE id = ?1", [&entry.id], |r| r.get(0))
            .optional()?;
        let current: EntryStatus = current
            .ok_or_else(|| StoreError::NotFound(format!("entry {}", entry.id)))?
            .parse()?;
        if !current.can_transition_to(entry.status) {
            return Err(StoreError::Validation(format!(
                "entry status cannot move from {current} to {}",
                entry.status
            )));
        }

        let now = self.clock.now();
        let n = conn.execute(
            "UPDATE entry SET
                short_code=?2, season_id=?3, realm_name=?4, entrant_name=?5,
                entrant_nickname=?6, entrant_email=?7, status=?8, payment_method=?9,
                payment_ref=?10, approved_at=?11, updated_at=?12
             WHERE id=?1",
            params![
                entry.id,
                entry.short_code,
                entry.season_id,
                entry.realm_name,
                entry.entrant_name,
                entry.entrant_nickname,
                entry.entrant_email,
                entry.status.to_string(),
                entry.payment_method.map(|m| m.to_string()),
                entry.payment_ref,
                opt_ts_to_sql(entry.approved_at),
                ts_to_sql(now),
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("entry {}", entry.id)));
        }
        entry.updated_at = Some(now);
        Ok(entry)
    }

    /// All entries matching `criteria`. `NotFound` when none do.
    pub fn select(&self, criteria: &Criteria, match_any: bool) -> Result<Vec<Entry>> {
        let (clause, values) = criteria.to_sql(ENTRY_CRITERIA_COLUMNS, match_any)?;
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{ENTRY_SELECT_SQL}{clause} ORDER BY created_at, id"))?;
        let entries = stmt
            .query_map(params_from_iter(values.iter()), row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if entries.is_empty() {
            return Err(StoreError::NotFound("no entries match criteria".into()));
        }
        Ok(entries)
    }

    pub fn select_by_id(&self, id: &str) -> Result<Entry> {
        let conn = self.db.lock().unwrap();
        conn.query_row(&format!("{ENTRY_SELECT_SQL} WHERE id = ?1"), [id], row_to_entry)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("entry {id}")),
                other => other.into(),
            })
    }

    pub fn exists_by_id(&self, id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM entry WHERE id = ?1", [id], |r| r.get(0))
            .optional()?;
        found
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("entry {id}")))
    }

    /// Entries registered for a season, optionally only those approved.
    /// An empty season is not an error here.
    pub fn select_by_season_id(&self, season_id: &str, approved_only: bool) -> Result<Vec<Entry>> {
        let mut criteria = Criteria::new().eq_str("season_id", season_id);
        if approved_only {
            criteria = criteria.is_not_null("approved_at");
        }
        match self.select(&criteria, false) {
            Err(StoreError::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }
}
