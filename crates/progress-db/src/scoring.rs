//! Scoring engine: per-answer point awards and quiz completion.
//!
//! Points accrue incrementally, one award per correct answer. Quiz
//! completion records metadata and advances the streak; it never awards
//! points itself, so completing the same quiz twice cannot double-count.

use chrono::{NaiveDate, Utc};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use crate::accounts::{PlayerAccount, account_from_row};
use crate::streak::{self, StreakState};
use crate::{Database, DbError};

pub const POINTS_PER_CORRECT_ANSWER: i64 = 50;

/// Unique per (account, course) completion record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedQuiz {
    pub id: i64,
    pub account_id: i64,
    pub course_id: i64,
    pub completed_at: String,
}

/// Outcome of a quiz completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizCompletion {
    pub record: CompletedQuiz,
    /// Whether this call created the completion record.
    pub first_completion: bool,
    /// Session score valued in points, for display. The points were already
    /// awarded per answer during the quiz; this is not re-credited.
    pub gained_points: i64,
    /// Account state after the streak update.
    pub account: PlayerAccount,
}

impl Database {
    /// Award the fixed points for one correct answer and refresh the
    /// account's leaderboard entry.
    ///
    /// The increment happens in place so interleaved awards never lose
    /// points to a stale read.
    pub fn award_correct_answer(&self, username: &str) -> Result<PlayerAccount, DbError> {
        let account = self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE player_accounts
                 SET points = points + ?1, updated_at = CURRENT_TIMESTAMP
                 WHERE username = ?2",
                rusqlite::params![POINTS_PER_CORRECT_ANSWER, username],
            )?;
            if updated == 0 {
                return Err(DbError::NotFound(format!("account {username}")));
            }
            conn.query_row(
                "SELECT id, username, points, current_streak, longest_streak,
                        last_activity_date, streak_freeze_count, fired_up_until, festival_until
                 FROM player_accounts WHERE username = ?1",
                [username],
                account_from_row,
            )
            .map_err(Into::into)
        })?;

        self.update_leaderboard_entry(&account.username, account.points)?;
        Ok(account)
    }

    /// Complete a quiz for today's date.
    pub fn complete_quiz(
        &self,
        username: &str,
        course_id: i64,
        session_score: i64,
    ) -> Result<QuizCompletion, DbError> {
        self.complete_quiz_on(username, course_id, session_score, Utc::now().date_naive())
    }

    /// Complete a quiz as of an explicit date. In one transaction: advance
    /// the streak, stamp the activity date and get-or-create the unique
    /// completion record. Idempotent for repeat completions on the same day.
    pub fn complete_quiz_on(
        &self,
        username: &str,
        course_id: i64,
        session_score: i64,
        today: NaiveDate,
    ) -> Result<QuizCompletion, DbError> {
        if course_id <= 0 {
            return Err(DbError::InvalidData(format!("course id {course_id}")));
        }
        if session_score < 0 {
            return Err(DbError::InvalidData(format!(
                "session score {session_score}"
            )));
        }

        let completion = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let account = tx
                .query_row(
                    "SELECT id, username, points, current_streak, longest_streak,
                            last_activity_date, streak_freeze_count, fired_up_until, festival_until
                     FROM player_accounts WHERE username = ?1",
                    [username],
                    account_from_row,
                )
                .optional()?
                .ok_or_else(|| DbError::NotFound(format!("account {username}")))?;

            let update = streak::advance(
                &StreakState {
                    current: account.current_streak,
                    longest: account.longest_streak,
                    last_activity: account.last_activity_date,
                    freezes_available: account.streak_freeze_count,
                },
                today,
            );
            if update.freeze_consumed {
                tracing::debug!(username, "Streak freeze consumed");
            }

            tx.execute(
                "UPDATE player_accounts
                 SET current_streak = ?1, longest_streak = ?2, last_activity_date = ?3,
                     streak_freeze_count = ?4, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?5",
                rusqlite::params![
                    update.current,
                    update.longest,
                    today.format("%Y-%m-%d").to_string(),
                    update.freezes_remaining,
                    account.id,
                ],
            )?;

            let first_completion = tx.execute(
                "INSERT OR IGNORE INTO completed_quizzes (account_id, course_id) VALUES (?1, ?2)",
                rusqlite::params![account.id, course_id],
            )? > 0;

            let record = tx.query_row(
                "SELECT id, account_id, course_id, completed_at
                 FROM completed_quizzes WHERE account_id = ?1 AND course_id = ?2",
                rusqlite::params![account.id, course_id],
                |row| {
                    Ok(CompletedQuiz {
                        id: row.get(0)?,
                        account_id: row.get(1)?,
                        course_id: row.get(2)?,
                        completed_at: row.get(3)?,
                    })
                },
            )?;

            let account = tx.query_row(
                "SELECT id, username, points, current_streak, longest_streak,
                        last_activity_date, streak_freeze_count, fired_up_until, festival_until
                 FROM player_accounts WHERE id = ?1",
                [account.id],
                account_from_row,
            )?;

            tx.commit()?;
            Ok(QuizCompletion {
                record,
                first_completion,
                gained_points: session_score * POINTS_PER_CORRECT_ANSWER,
                account,
            })
        })?;

        // Hot-path refresh; the deletion sweep is left to the full sync.
        self.update_leaderboard_entry(&completion.account.username, completion.account.points)?;
        Ok(completion)
    }

    pub fn completed_courses(&self, username: &str) -> Result<Vec<i64>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cq.course_id
                 FROM completed_quizzes cq
                 INNER JOIN player_accounts pa ON pa.id = cq.account_id
                 WHERE pa.username = ?1 ORDER BY cq.course_id",
            )?;
            let rows = stmt.query_map([username], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test DB")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn test_award_adds_fixed_points() {
        let db = test_db();
        db.get_or_create_account("alice").unwrap();

        let account = db.award_correct_answer("alice").unwrap();
        assert_eq!(account.points, POINTS_PER_CORRECT_ANSWER);

        let account = db.award_correct_answer("alice").unwrap();
        assert_eq!(account.points, 2 * POINTS_PER_CORRECT_ANSWER);
    }

    #[test]
    fn test_award_unknown_account() {
        let db = test_db();
        assert!(matches!(
            db.award_correct_answer("ghost"),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_award_updates_leaderboard_entry() {
        let db = test_db();
        db.get_or_create_account("alice").unwrap();
        db.award_correct_answer("alice").unwrap();

        let entry = db.get_leaderboard_entry("alice").unwrap().unwrap();
        assert_eq!(entry.score, POINTS_PER_CORRECT_ANSWER);
    }

    #[test]
    fn test_completion_is_idempotent_per_course() {
        let db = test_db();
        db.get_or_create_account("alice").unwrap();

        let first = db.complete_quiz_on("alice", 3, 2, day(10)).unwrap();
        assert!(first.first_completion);
        assert_eq!(first.gained_points, 100);

        let second = db.complete_quiz_on("alice", 3, 2, day(10)).unwrap();
        assert!(!second.first_completion);
        assert_eq!(second.record.id, first.record.id);

        // A different course gets its own record.
        let other = db.complete_quiz_on("alice", 4, 0, day(10)).unwrap();
        assert!(other.first_completion);
        assert_eq!(db.completed_courses("alice").unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_completion_never_awards_points() {
        let db = test_db();
        db.get_or_create_account("alice").unwrap();
        db.award_correct_answer("alice").unwrap();

        let completion = db.complete_quiz_on("alice", 1, 5, day(10)).unwrap();
        assert_eq!(completion.gained_points, 250);
        assert_eq!(completion.account.points, POINTS_PER_CORRECT_ANSWER);
    }

    #[test]
    fn test_streak_advances_across_days() {
        let db = test_db();
        db.get_or_create_account("alice").unwrap();

        let c = db.complete_quiz_on("alice", 1, 0, day(10)).unwrap();
        assert_eq!(c.account.current_streak, 1);
        assert_eq!(c.account.last_activity_date, Some(day(10)));

        let c = db.complete_quiz_on("alice", 2, 0, day(11)).unwrap();
        assert_eq!(c.account.current_streak, 2);
        assert_eq!(c.account.longest_streak, 2);

        // Same day again: no inflation.
        let c = db.complete_quiz_on("alice", 3, 0, day(11)).unwrap();
        assert_eq!(c.account.current_streak, 2);

        // Five days idle: reset.
        let c = db.complete_quiz_on("alice", 4, 0, day(16)).unwrap();
        assert_eq!(c.account.current_streak, 1);
        assert_eq!(c.account.longest_streak, 2);
    }

    #[test]
    fn test_streak_freeze_bridges_one_missed_day() {
        let db = test_db();
        db.get_or_create_account("alice").unwrap();
        db.add_streak_freezes("alice", 1).unwrap();

        db.complete_quiz_on("alice", 1, 0, day(10)).unwrap();
        let c = db.complete_quiz_on("alice", 2, 0, day(12)).unwrap();
        assert_eq!(c.account.current_streak, 2);
        assert_eq!(c.account.streak_freeze_count, 0);
    }

    #[test]
    fn test_invalid_inputs() {
        let db = test_db();
        db.get_or_create_account("alice").unwrap();
        assert!(matches!(
            db.complete_quiz_on("alice", 0, 1, day(10)),
            Err(DbError::InvalidData(_))
        ));
        assert!(matches!(
            db.complete_quiz_on("alice", 1, -1, day(10)),
            Err(DbError::InvalidData(_))
        ));
        assert!(matches!(
            db.complete_quiz_on("ghost", 1, 1, day(10)),
            Err(DbError::NotFound(_))
        ));
    }
}
