//! Database schema definitions and migrations.

use rusqlite::Connection;

use crate::DbError;

pub fn run_migrations(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(SCHEMA)?;
    migrate_effect_columns(conn)?;
    Ok(())
}

/// Accounts created before the shop effects existed lack the effect columns.
fn migrate_effect_columns(conn: &Connection) -> Result<(), DbError> {
    if !column_exists(conn, "player_accounts", "streak_freeze_count")? {
        tracing::info!("Adding streak_freeze_count column to player_accounts");
        conn.execute_batch(
            "ALTER TABLE player_accounts ADD COLUMN streak_freeze_count INTEGER NOT NULL DEFAULT 0;",
        )?;
    }
    if !column_exists(conn, "player_accounts", "fired_up_until")? {
        tracing::info!("Adding timed boost columns to player_accounts");
        conn.execute_batch(
            "ALTER TABLE player_accounts ADD COLUMN fired_up_until TEXT;
             ALTER TABLE player_accounts ADD COLUMN festival_until TEXT;",
        )?;
    }
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DbError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .any(|name| name.as_deref() == Ok(column));
    Ok(exists)
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS player_accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    points INTEGER NOT NULL DEFAULT 0 CHECK(points >= 0),
    current_streak INTEGER NOT NULL DEFAULT 0,
    longest_streak INTEGER NOT NULL DEFAULT 0,
    last_activity_date TEXT,
    streak_freeze_count INTEGER NOT NULL DEFAULT 0,
    fired_up_until TEXT,
    festival_until TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS shop_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    price INTEGER NOT NULL CHECK(price > 0),
    icon TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS purchases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id INTEGER NOT NULL,
    item_id INTEGER NOT NULL,
    purchased_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(account_id, item_id),
    FOREIGN KEY (account_id) REFERENCES player_accounts(id) ON DELETE CASCADE,
    FOREIGN KEY (item_id) REFERENCES shop_items(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS completed_quizzes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id INTEGER NOT NULL,
    course_id INTEGER NOT NULL,
    completed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(account_id, course_id),
    FOREIGN KEY (account_id) REFERENCES player_accounts(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS leaderboard_entries (
    name TEXT PRIMARY KEY,
    score INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_purchases_account_id
    ON purchases(account_id);

CREATE INDEX IF NOT EXISTS idx_completed_quizzes_account_id
    ON completed_quizzes(account_id);

CREATE INDEX IF NOT EXISTS idx_leaderboard_entries_score
    ON leaderboard_entries(score DESC);
"#;
