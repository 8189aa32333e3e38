use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use league_core::Clock;
use rusqlite::{params, params_from_iter, types::Type, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use crate::criteria::Criteria;
use crate::db::{get_ts, ts_to_sql};
use crate::error::{Result, StoreError};
use crate::types::{Token, TokenType};

/// How long an issued token stays valid.
pub const TOKEN_TTL_MINUTES: i64 = 20;

const TOKEN_SELECT_SQL: &str = "SELECT id, type, value, issued_at, expires_at FROM token";
const TOKEN_CRITERIA_COLUMNS: &[&str] = &["id", "type", "value"];

fn row_to_token(row: &Row<'_>) -> rusqlite::Result<Token> {
    let token_type: String = row.get(1)?;
    Ok(Token {
        id: row.get(0)?,
        token_type: token_type
            .parse()
            .map_err(|e: StoreError| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
        value: row.get(2)?,
        issued_at: get_ts(row, 3)?,
        expires_at: get_ts(row, 4)?,
    })
}

pub struct TokenRepo {
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl TokenRepo {
    pub fn new(db: Arc<Mutex<Connection>>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Issue a token carrying `value`. The id is 32 random hex characters.
    pub fn insert(&self, token_type: TokenType, value: &str) -> Result<Token> {
        let issued_at = self.clock.now();
        let token = Token {
            id: Uuid::new_v4().simple().to_string(),
            token_type,
            value: value.to_string(),
            issued_at,
            expires_at: issued_at + Duration::minutes(TOKEN_TTL_MINUTES),
        };

        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO token (id, type, value, issued_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                token.id,
                token.token_type.to_string(),
                token.value,
                ts_to_sql(token.issued_at),
                ts_to_sql(token.expires_at),
            ],
        )?;
        Ok(token)
    }

    pub fn select(&self, criteria: &Criteria, match_any: bool) -> Result<Vec<Token>> {
        let (clause, values) = criteria.to_sql(TOKEN_CRITERIA_COLUMNS, match_any)?;
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{TOKEN_SELECT_SQL}{clause} ORDER BY issued_at"))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_token)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if rows.is_empty() {
            return Err(StoreError::NotFound("no tokens match criteria".into()));
        }
        Ok(rows)
    }

    pub fn select_by_id(&self, id: &str) -> Result<Token> {
        let conn = self.db.lock().unwrap();
        conn.query_row(&format!("{TOKEN_SELECT_SQL} WHERE id = ?1"), [id], row_to_token)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("token {id}")))
    }

    /// Consume a token.
    pub fn delete_by_id(&self, id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let n = conn.execute("DELETE FROM token WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("token {id}")));
        }
        Ok(())
    }

    /// Remove every token that expired at or before `ts`. Returns how many
    /// were removed.
    pub fn delete_expired(&self, ts: DateTime<Utc>) -> Result<usize> {
        let conn = self.db.lock().unwrap();
        let n = conn.execute("DELETE FROM token WHERE expires_at <= ?1", [ts_to_sql(ts)])?;
        debug!(removed = n, "expired tokens deleted");
        Ok(n)
    }
}
