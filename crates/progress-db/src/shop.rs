//! Shop catalog and point-spending purchases.

use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use crate::{Database, DbError};

/// Immutable catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShopItem {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub icon: String,
}

/// Append-only record of a completed purchase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Purchase {
    pub id: i64,
    pub account_id: i64,
    pub item_id: i64,
    pub purchased_at: String,
}

/// Result of a purchase attempt. Rejections are ordinary outcomes for the
/// caller to surface, not errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased(Purchase),
    AlreadyOwned,
    InsufficientFunds,
}

impl Database {
    pub fn add_shop_item(
        &self,
        name: &str,
        description: &str,
        price: i64,
        icon: &str,
    ) -> Result<ShopItem, DbError> {
        if price <= 0 {
            return Err(DbError::InvalidData(format!("item price {price}")));
        }
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO shop_items (name, description, price, icon) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![name, description, price, icon],
            )?;
            let id = conn.last_insert_rowid();
            Ok(ShopItem {
                id,
                name: name.to_string(),
                description: description.to_string(),
                price,
                icon: icon.to_string(),
            })
        })
    }

    pub fn get_shop_item(&self, item_id: i64) -> Result<Option<ShopItem>, DbError> {
        self.with_conn(|conn| {
            let item = conn
                .query_row(
                    "SELECT id, name, description, price, icon FROM shop_items WHERE id = ?1",
                    [item_id],
                    item_from_row,
                )
                .optional()?;
            Ok(item)
        })
    }

    pub fn get_all_shop_items(&self) -> Result<Vec<ShopItem>, DbError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, description, price, icon FROM shop_items ORDER BY price, name")?;
            let rows = stmt.query_map([], item_from_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
    }

    /// Attempt to buy an item. The debit and the purchase record are one
    /// atomic unit; the debit only applies when the balance covers the
    /// price, so concurrent attempts cannot overspend.
    pub fn purchase_item(&self, username: &str, item_id: i64) -> Result<PurchaseOutcome, DbError> {
        if item_id <= 0 {
            return Err(DbError::InvalidData(format!("item id {item_id}")));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let price: i64 = tx
                .query_row(
                    "SELECT price FROM shop_items WHERE id = ?1",
                    [item_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| DbError::NotFound(format!("shop item {item_id}")))?;

            let account_id: i64 = tx
                .query_row(
                    "SELECT id FROM player_accounts WHERE username = ?1",
                    [username],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| DbError::NotFound(format!("account {username}")))?;

            let already_owned: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM purchases WHERE account_id = ?1 AND item_id = ?2)",
                rusqlite::params![account_id, item_id],
                |row| row.get(0),
            )?;
            if already_owned {
                return Ok(PurchaseOutcome::AlreadyOwned);
            }

            // Conditional debit: zero rows affected means the balance fell short.
            let debited = tx.execute(
                "UPDATE player_accounts
                 SET points = points - ?1, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?2 AND points >= ?1",
                rusqlite::params![price, account_id],
            )?;
            if debited == 0 {
                return Ok(PurchaseOutcome::InsufficientFunds);
            }

            tx.execute(
                "INSERT INTO purchases (account_id, item_id) VALUES (?1, ?2)",
                rusqlite::params![account_id, item_id],
            )?;
            let purchase = tx.query_row(
                "SELECT id, account_id, item_id, purchased_at FROM purchases WHERE id = ?1",
                [tx.last_insert_rowid()],
                purchase_from_row,
            )?;

            tx.commit()?;
            tracing::info!(username, item_id, price, "Purchase completed");
            Ok(PurchaseOutcome::Purchased(purchase))
        })
    }

    pub fn owns_item(&self, username: &str, item_id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let owned: bool = conn.query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM purchases p
                     INNER JOIN player_accounts pa ON pa.id = p.account_id
                     WHERE pa.username = ?1 AND p.item_id = ?2)",
                rusqlite::params![username, item_id],
                |row| row.get(0),
            )?;
            Ok(owned)
        })
    }

    pub fn purchases_for_account(&self, username: &str) -> Result<Vec<Purchase>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.account_id, p.item_id, p.purchased_at
                 FROM purchases p
                 INNER JOIN player_accounts pa ON pa.id = p.account_id
                 WHERE pa.username = ?1 ORDER BY p.purchased_at, p.id",
            )?;
            let rows = stmt.query_map([username], purchase_from_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
    }
}

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShopItem> {
    Ok(ShopItem {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        icon: row.get(4)?,
    })
}

fn purchase_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Purchase> {
    Ok(Purchase {
        id: row.get(0)?,
        account_id: row.get(1)?,
        item_id: row.get(2)?,
        purchased_at: row.get(3)?,
    })
}
