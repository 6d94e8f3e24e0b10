//! Leaderboard reconciliation and the cached read path.
//!
//! `leaderboard_entries` is derived data: always re-derivable from the set
//! of accounts with positive points. The full sync is the only writer that
//! removes rows; the per-account upsert is the hot path after a scoring
//! event and leaves stale rows for the next sync to sweep.

use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use crate::cache::{LEADERBOARD_CACHE_KEY, TtlCache};
use crate::{Database, DbError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: i64,
}

/// Counts from one full reconciliation pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Ordered standings plus the viewer's position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardSnapshot {
    pub entries: Vec<LeaderboardEntry>,
    /// 1-based rank of the requesting user, if present.
    pub viewer_rank: Option<usize>,
    pub total_players: usize,
}

impl Database {
    /// Reconcile every leaderboard entry against authoritative account
    /// points, then remove entries for accounts that no longer qualify.
    /// Running it twice in a row reports all zeros on the second pass.
    pub fn sync_leaderboard(&self) -> Result<SyncReport, DbError> {
        let report = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut report = SyncReport::default();

            let accounts: Vec<(String, i64)> = {
                let mut stmt = tx.prepare(
                    "SELECT username, points FROM player_accounts WHERE points > 0",
                )?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            for (username, points) in &accounts {
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT score FROM leaderboard_entries WHERE name = ?1",
                        [username],
                        |row| row.get(0),
                    )
                    .optional()?;
                match existing {
                    None => {
                        tx.execute(
                            "INSERT INTO leaderboard_entries (name, score) VALUES (?1, ?2)",
                            rusqlite::params![username, points],
                        )?;
                        report.created += 1;
                    }
                    Some(score) if score != *points => {
                        tx.execute(
                            "UPDATE leaderboard_entries SET score = ?1 WHERE name = ?2",
                            rusqlite::params![points, username],
                        )?;
                        report.updated += 1;
                    }
                    Some(_) => {}
                }
            }

            report.removed = tx.execute(
                "DELETE FROM leaderboard_entries
                 WHERE name NOT IN (SELECT username FROM player_accounts WHERE points > 0)",
                [],
            )?;

            tx.commit()?;
            Ok(report)
        })?;

        tracing::info!(
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            "Leaderboard sync completed"
        );
        Ok(report)
    }

    /// Incremental fast path: upsert one entry, no deletion sweep.
    pub fn update_leaderboard_entry(&self, name: &str, points: i64) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO leaderboard_entries (name, score) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET score = excluded.score
                 WHERE score != excluded.score",
                rusqlite::params![name, points],
            )?;
            Ok(())
        })
    }

    /// Legacy by-name score submission. Adds onto whatever the entry holds;
    /// the next full sync overwrites it with authoritative account points.
    pub fn submit_score(&self, name: &str, points_earned: i64) -> Result<(), DbError> {
        if name.trim().is_empty() {
            return Err(DbError::InvalidData("empty leaderboard name".into()));
        }
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO leaderboard_entries (name, score) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET score = score + ?2",
                rusqlite::params![name, points_earned],
            )?;
            Ok(())
        })
    }

    pub fn get_leaderboard_entry(&self, name: &str) -> Result<Option<LeaderboardEntry>, DbError> {
        self.with_conn(|conn| {
            let entry = conn
                .query_row(
                    "SELECT name, score FROM leaderboard_entries WHERE name = ?1",
                    [name],
                    entry_from_row,
                )
                .optional()?;
            Ok(entry)
        })
    }

    /// All entries, best score first, ties broken by name.
    pub fn get_leaderboard_entries(&self) -> Result<Vec<LeaderboardEntry>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, score FROM leaderboard_entries ORDER BY score DESC, name ASC",
            )?;
            let rows = stmt.query_map([], entry_from_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LeaderboardEntry> {
    Ok(LeaderboardEntry {
        name: row.get(0)?,
        score: row.get(1)?,
    })
}

/// Read-through view of the leaderboard. A cache hit serves the stored
/// ordering without touching the database; a miss runs a full sync and
/// repopulates the cache. The viewer's rank is computed per request from
/// the ordering, so a cached snapshot serves any viewer.
pub fn leaderboard_snapshot(
    db: &Database,
    cache: &TtlCache<Vec<LeaderboardEntry>>,
    viewer: Option<&str>,
) -> Result<LeaderboardSnapshot, DbError> {
    let entries = match cache.get(LEADERBOARD_CACHE_KEY) {
        Some(entries) => {
            tracing::debug!("Leaderboard cache hit");
            entries
        }
        None => {
            tracing::debug!("Leaderboard cache miss, running full sync");
            db.sync_leaderboard()?;
            let entries = db.get_leaderboard_entries()?;
            cache.set(LEADERBOARD_CACHE_KEY, entries.clone());
            entries
        }
    };

    let viewer_rank =
        viewer.and_then(|name| entries.iter().position(|e| e.name == name).map(|i| i + 1));
    let total_players = entries.len();
    Ok(LeaderboardSnapshot {
        entries,
        viewer_rank,
        total_players,
    })
}
