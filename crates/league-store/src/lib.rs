pub mod criteria;
pub mod db;
pub mod entries;
pub mod error;
pub mod predictions;
pub mod scored;
pub mod standings;
pub mod tokens;
pub mod types;

use std::sync::{Arc, Mutex};

use league_core::Clock;
use rusqlite::Connection;

pub use criteria::Criteria;
pub use entries::EntryRepo;
pub use error::{Result, StoreError};
pub use predictions::PredictionRepo;
pub use scored::ScoredPredictionRepo;
pub use standings::StandingsRepo;
pub use tokens::TokenRepo;
pub use types::*;

/// One repository per entity, all sharing a single connection.
pub struct Store {
    pub entries: EntryRepo,
    pub predictions: PredictionRepo,
    pub standings: StandingsRepo,
    pub scored: ScoredPredictionRepo,
    pub tokens: TokenRepo,
}

impl Store {
    /// Wrap an open connection, creating any missing tables.
    pub fn new(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        db::init_db(&conn)?;
        let db = Arc::new(Mutex::new(conn));
        Ok(Self {
            entries: EntryRepo::new(db.clone(), clock.clone()),
            predictions: PredictionRepo::new(db.clone(), clock.clone()),
            standings: StandingsRepo::new(db.clone(), clock.clone()),
            scored: ScoredPredictionRepo::new(db.clone(), clock.clone()),
            tokens: TokenRepo::new(db, clock),
        })
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::new(conn, clock)
    }
}
