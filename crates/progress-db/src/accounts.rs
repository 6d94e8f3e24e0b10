//! Player account storage: points, streaks and shop item effects.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use crate::{Database, DbError};

/// A user's gamification state. One row per user identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerAccount {
    pub id: i64,
    pub username: String,
    pub points: i64,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_activity_date: Option<NaiveDate>,
    pub streak_freeze_count: i32,
    pub fired_up_until: Option<String>,
    pub festival_until: Option<String>,
}

/// Effects granted by shop items that are currently active on an account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Effect {
    StreakFreeze,
    FiredUp,
    ExperienceFestival,
}

/// Effects active at `now`. Timed boosts use RFC 3339 expirations; an
/// unparseable expiration counts as expired.
pub fn active_effects(account: &PlayerAccount, now: DateTime<Utc>) -> Vec<Effect> {
    let mut effects = Vec::new();
    if account.streak_freeze_count > 0 {
        effects.push(Effect::StreakFreeze);
    }
    if boost_active(account.fired_up_until.as_deref(), now) {
        effects.push(Effect::FiredUp);
    }
    if boost_active(account.festival_until.as_deref(), now) {
        effects.push(Effect::ExperienceFestival);
    }
    effects
}

fn boost_active(until: Option<&str>, now: DateTime<Utc>) -> bool {
    until
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .is_some_and(|expires| now < expires)
}

const ACCOUNT_COLUMNS: &str = "id, username, points, current_streak, longest_streak, \
     last_activity_date, streak_freeze_count, fired_up_until, festival_until";

pub(crate) fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlayerAccount> {
    let last_activity: Option<String> = row.get(5)?;
    Ok(PlayerAccount {
        id: row.get(0)?,
        username: row.get(1)?,
        points: row.get(2)?,
        current_streak: row.get(3)?,
        longest_streak: row.get(4)?,
        last_activity_date: last_activity
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        streak_freeze_count: row.get(6)?,
        fired_up_until: row.get(7)?,
        festival_until: row.get(8)?,
    })
}

impl Database {
    /// Fetch an account, creating it with zeroed state on first access.
    /// Returns the account and whether it was created by this call.
    pub fn get_or_create_account(
        &self,
        username: &str,
    ) -> Result<(PlayerAccount, bool), DbError> {
        if username.trim().is_empty() {
            return Err(DbError::InvalidData("empty username".into()));
        }
        self.with_conn(|conn| {
            let created = conn.execute(
                "INSERT OR IGNORE INTO player_accounts (username) VALUES (?1)",
                [username],
            )? > 0;
            if created {
                tracing::info!(username, "Created new player account");
            }
            let account = conn.query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM player_accounts WHERE username = ?1"),
                [username],
                account_from_row,
            )?;
            Ok((account, created))
        })
    }

    pub fn get_account(&self, username: &str) -> Result<Option<PlayerAccount>, DbError> {
        self.with_conn(|conn| {
            let account = conn
                .query_row(
                    &format!("SELECT {ACCOUNT_COLUMNS} FROM player_accounts WHERE username = ?1"),
                    [username],
                    account_from_row,
                )
                .optional()?;
            Ok(account)
        })
    }

    /// Usernames and points of every account with a positive balance,
    /// the authoritative input for leaderboard reconciliation.
    pub fn accounts_with_points(&self) -> Result<Vec<(String, i64)>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, points FROM player_accounts WHERE points > 0 ORDER BY username",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
    }

    pub fn add_streak_freezes(&self, username: &str, count: i32) -> Result<(), DbError> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE player_accounts
                 SET streak_freeze_count = streak_freeze_count + ?1, updated_at = CURRENT_TIMESTAMP
                 WHERE username = ?2",
                rusqlite::params![count.max(0), username],
            )?;
            if updated == 0 {
                return Err(DbError::NotFound(format!("account {username}")));
            }
            Ok(())
        })
    }

    /// Set the timed boost expirations (RFC 3339). `None` clears a boost.
    pub fn set_timed_boosts(
        &self,
        username: &str,
        fired_up_until: Option<&str>,
        festival_until: Option<&str>,
    ) -> Result<(), DbError> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE player_accounts
                 SET fired_up_until = ?1, festival_until = ?2, updated_at = CURRENT_TIMESTAMP
                 WHERE username = ?3",
                rusqlite::params![fired_up_until, festival_until, username],
            )?;
            if updated == 0 {
                return Err(DbError::NotFound(format!("account {username}")));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test DB")
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let db = test_db();
        let (first, created) = db.get_or_create_account("alice").unwrap();
        assert!(created);
        assert_eq!(first.points, 0);
        assert_eq!(first.current_streak, 0);
        assert!(first.last_activity_date.is_none());

        let (second, created) = db.get_or_create_account("alice").unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[test]
    fn test_empty_username_rejected() {
        let db = test_db();
        assert!(matches!(
            db.get_or_create_account("  "),
            Err(DbError::InvalidData(_))
        ));
    }

    #[test]
    fn test_missing_account_is_none() {
        let db = test_db();
        assert!(db.get_account("ghost").unwrap().is_none());
        assert!(matches!(
            db.add_streak_freezes("ghost", 1),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_accounts_with_points_excludes_zero() {
        let db = test_db();
        db.get_or_create_account("alice").unwrap();
        db.get_or_create_account("bob").unwrap();
        db.award_correct_answer("bob").unwrap();

        let rows = db.accounts_with_points().unwrap();
        assert_eq!(rows, vec![("bob".to_string(), 50)]);
    }

    #[test]
    fn test_active_effects() {
        let db = test_db();
        db.get_or_create_account("alice").unwrap();
        db.add_streak_freezes("alice", 2).unwrap();
        db.set_timed_boosts("alice", Some("2030-01-01T00:00:00Z"), None)
            .unwrap();

        let account = db.get_account("alice").unwrap().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        assert_eq!(
            active_effects(&account, now),
            vec![Effect::StreakFreeze, Effect::FiredUp]
        );

        // Expired boost drops out.
        let later = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(active_effects(&account, later), vec![Effect::StreakFreeze]);
    }
}
