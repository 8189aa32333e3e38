use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{types::Type, Connection, Result, Row};
use serde::de::DeserializeOwned;

/// Initialise every table the pipeline touches. Safe to call on every
/// startup: CREATE IF NOT EXISTS keeps it idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_entry_tables(conn)?;
    create_standings_tables(conn)?;
    create_token_table(conn)?;
    Ok(())
}

fn create_entry_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS entry (
            id                TEXT PRIMARY KEY NOT NULL,
            short_code        TEXT NOT NULL UNIQUE,
            season_id         TEXT NOT NULL,
            realm_name        TEXT NOT NULL,
            entrant_name      TEXT NOT NULL,
            entrant_nickname  TEXT NOT NULL,
            entrant_email     TEXT NOT NULL,
            status            TEXT NOT NULL DEFAULT 'pending',
            payment_method    TEXT,
            payment_ref       TEXT,
            approved_at       TEXT,
            created_at        TEXT NOT NULL,
            updated_at        TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_entry_season ON entry(season_id);

        CREATE TABLE IF NOT EXISTS entry_prediction (
            id          TEXT PRIMARY KEY NOT NULL,
            entry_id    TEXT NOT NULL REFERENCES entry(id) ON DELETE CASCADE,
            rankings    TEXT NOT NULL,  -- JSON array of team ids
            created_at  TEXT NOT NULL
        );
        -- point-in-time lookup walks this index backwards
        CREATE INDEX IF NOT EXISTS idx_entry_prediction_entry_created
            ON entry_prediction(entry_id, created_at);",
    )
}

fn create_standings_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS standings (
            id            TEXT PRIMARY KEY NOT NULL,
            season_id     TEXT NOT NULL,
            round_number  INTEGER NOT NULL,
            rankings      TEXT NOT NULL,  -- JSON array of {id, position, metadata}
            finalised     INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL,
            updated_at    TEXT,
            UNIQUE(season_id, round_number)
        );

        CREATE TABLE IF NOT EXISTS scored_entry_prediction (
            entry_prediction_id  TEXT NOT NULL REFERENCES entry_prediction(id) ON DELETE CASCADE,
            standings_id         TEXT NOT NULL REFERENCES standings(id) ON DELETE CASCADE,
            rankings             TEXT NOT NULL,  -- JSON array of {id, position, score}
            score                INTEGER NOT NULL,
            created_at           TEXT NOT NULL,
            updated_at           TEXT,
            PRIMARY KEY (entry_prediction_id, standings_id)
        );
        CREATE INDEX IF NOT EXISTS idx_scored_standings
            ON scored_entry_prediction(standings_id);",
    )
}

fn create_token_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS token (
            id          TEXT PRIMARY KEY NOT NULL,
            type        TEXT NOT NULL,
            value       TEXT NOT NULL,
            issued_at   TEXT NOT NULL,
            expires_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_token_expires ON token(expires_at);",
    )
}

/// Fixed-width UTC text so that string order matches instant order.
pub(crate) fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn opt_ts_to_sql(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(ts_to_sql)
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

pub(crate) fn get_opt_ts(row: &Row<'_>, idx: usize) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

fn parse_ts(idx: usize, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode a JSON rankings column.
pub(crate) fn get_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
