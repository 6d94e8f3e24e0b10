//! SQLite ledger for the learning platform's gamification state:
//! player points, daily streaks, shop purchases and the leaderboard.

pub mod accounts;
pub mod cache;
pub mod leaderboard;
pub mod schema;
pub mod scoring;
pub mod shop;
pub mod streak;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

/// Thread-safe database handle wrapping a single SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.configure()?;
        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.configure()?;
        db.migrate()?;
        Ok(db)
    }

    /// Access the underlying connection with a closure.
    pub fn with_conn<F, R>(&self, f: F) -> Result<R, DbError>
    where
        F: FnOnce(&Connection) -> Result<R, DbError>,
    {
        let conn = self.conn.lock().map_err(|_| DbError::LockPoisoned)?;
        f(&conn)
    }

    /// Access the underlying connection mutably (for transactions).
    pub fn with_conn_mut<F, R>(&self, f: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut Connection) -> Result<R, DbError>,
    {
        let mut conn = self.conn.lock().map_err(|_| DbError::LockPoisoned)?;
        f(&mut conn)
    }

    fn configure(&self) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA busy_timeout=5000;
                 PRAGMA foreign_keys=ON;",
            )?;
            Ok(())
        })
    }

    fn migrate(&self) -> Result<(), DbError> {
        self.with_conn(|conn| {
            schema::run_migrations(conn)?;
            Ok(())
        })
    }
}

/// Database error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LEADERBOARD_CACHE_KEY, TtlCache};
    use crate::leaderboard::leaderboard_snapshot;
    use crate::scoring::POINTS_PER_CORRECT_ANSWER;
    use crate::shop::PurchaseOutcome;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test DB")
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_open_and_migrate() {
        let db = test_db();
        assert!(db.get_account("nobody").unwrap().is_none());
        assert!(db.get_all_shop_items().unwrap().is_empty());
    }

    #[test]
    fn test_quiz_to_leaderboard_flow() {
        // New account answers 3 questions, completes the quiz twice,
        // and shows up on the leaderboard without a full sync.
        let db = test_db();
        let (account, created) = db.get_or_create_account("alice").unwrap();
        assert!(created);
        assert_eq!(account.points, 0);

        for _ in 0..3 {
            db.award_correct_answer("alice").unwrap();
        }
        let account = db.get_account("alice").unwrap().unwrap();
        assert_eq!(account.points, 3 * POINTS_PER_CORRECT_ANSWER);

        let today = day(2025, 6, 10);
        let first = db.complete_quiz_on("alice", 7, 3, today).unwrap();
        assert!(first.first_completion);
        assert_eq!(first.gained_points, 3 * POINTS_PER_CORRECT_ANSWER);
        assert_eq!(first.account.points, 150);

        // Repeated completion neither duplicates the record nor touches points.
        let second = db.complete_quiz_on("alice", 7, 3, today).unwrap();
        assert!(!second.first_completion);
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(second.account.points, 150);

        let entry = db.get_leaderboard_entry("alice").unwrap().unwrap();
        assert_eq!(entry.score, 150);
    }

    #[test]
    fn test_purchase_flow_against_scored_points() {
        let db = test_db();
        db.get_or_create_account("bob").unwrap();
        let item = db.add_shop_item("Streak Freeze", "Protects a streak", 100, "❄️").unwrap();

        db.award_correct_answer("bob").unwrap();
        db.award_correct_answer("bob").unwrap();

        match db.purchase_item("bob", item.id).unwrap() {
            PurchaseOutcome::Purchased(p) => assert_eq!(p.item_id, item.id),
            other => panic!("expected purchase, got {other:?}"),
        }
        assert_eq!(db.get_account("bob").unwrap().unwrap().points, 0);
        assert!(matches!(
            db.purchase_item("bob", item.id).unwrap(),
            PurchaseOutcome::AlreadyOwned
        ));
    }

    #[test]
    fn test_snapshot_reads_through_cache() {
        let db = test_db();
        db.get_or_create_account("carol").unwrap();
        db.award_correct_answer("carol").unwrap();

        let cache = TtlCache::new(Duration::from_secs(300));
        let snap = leaderboard_snapshot(&db, &cache, Some("carol")).unwrap();
        assert_eq!(snap.total_players, 1);
        assert_eq!(snap.viewer_rank, Some(1));
        assert!(cache.get(LEADERBOARD_CACHE_KEY).is_some());

        // Served from cache until expiry, so a later score change is not seen.
        db.award_correct_answer("carol").unwrap();
        let stale = leaderboard_snapshot(&db, &cache, Some("carol")).unwrap();
        assert_eq!(stale.entries[0].score, snap.entries[0].score);

        cache.clear();
        let fresh = leaderboard_snapshot(&db, &cache, Some("carol")).unwrap();
        assert_eq!(fresh.entries[0].score, 2 * POINTS_PER_CORRECT_ANSWER);
    }
}
