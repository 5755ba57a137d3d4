//! API key registry.
//!
//! An API key is a bearer capability bound to one game and owned by the
//! account that issued it. Presenting the key is enough to act on that
//! game's sessions and events; no login is involved.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::accounts::{get_account, Account};
use crate::credentials::generate_token;
use crate::games::{get_game, Game};
use crate::{now_timestamp, StoreError};

/// A per-game bearer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// The secret key string; doubles as the record ID.
    pub key: String,
    /// Human-readable label.
    pub name: String,
    /// Account that issued the key.
    pub account_id: i64,
    /// Game the key is scoped to.
    pub game_id: i64,
    pub start_at: String,
}

/// Everything a presented key resolves to.
#[derive(Debug, Clone)]
pub struct KeyGrant {
    pub key: ApiKey,
    pub account: Account,
    pub game: Game,
}

const KEY_COLUMNS: &str = "key, name, account_id, game_id, start_at";

fn map_row_to_key(row: &Row) -> rusqlite::Result<ApiKey> {
    Ok(ApiKey {
        key: row.get(0)?,
        name: row.get(1)?,
        account_id: row.get(2)?,
        game_id: row.get(3)?,
        start_at: row.get(4)?,
    })
}

/// Issues a new key for `game_id`, owned by `account_id`.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if the game does not exist.
pub fn create_key(
    conn: &Connection,
    name: &str,
    account_id: i64,
    game_id: i64,
) -> Result<ApiKey, StoreError> {
    get_game(conn, game_id)?;

    let key = ApiKey {
        key: generate_token(),
        name: name.to_string(),
        account_id,
        game_id,
        start_at: now_timestamp(),
    };
    conn.execute(
        "INSERT INTO api_keys (key, name, account_id, game_id, start_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![key.key, key.name, key.account_id, key.game_id, key.start_at],
    )?;

    tracing::info!(account_id, game_id, "api key issued");
    Ok(key)
}

/// Retrieves a key record.
pub fn get_key(conn: &Connection, key: &str) -> Result<ApiKey, StoreError> {
    conn.query_row(
        &format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE key = ?1"),
        [key],
        map_row_to_key,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("api key", key))
}

/// Resolves a presented key to its owning account and scoped game.
///
/// # Errors
///
/// Returns `StoreError::NotFound` for an unknown key.
pub fn resolve_key(conn: &Connection, key: &str) -> Result<KeyGrant, StoreError> {
    let key = get_key(conn, key)?;
    let account = get_account(conn, key.account_id)?;
    let game = get_game(conn, key.game_id)?;
    Ok(KeyGrant { key, account, game })
}

/// Lists the keys issued by an account.
pub fn list_keys_for_account(conn: &Connection, account_id: i64) -> Result<Vec<ApiKey>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {KEY_COLUMNS} FROM api_keys WHERE account_id = ?1 ORDER BY start_at ASC, key ASC"
    ))?;
    let rows = stmt.query_map([account_id], map_row_to_key)?;
    let mut keys = Vec::new();
    for row in rows {
        keys.push(row?);
    }
    Ok(keys)
}

/// Deletes a single key.
pub fn delete_key(conn: &Connection, key: &str) -> Result<(), StoreError> {
    let changed = conn.execute("DELETE FROM api_keys WHERE key = ?1", [key])?;
    if changed == 0 {
        return Err(StoreError::not_found("api key", key));
    }
    Ok(())
}

/// Deletes every key issued by an account, returning how many were removed.
pub fn delete_keys_for_account(conn: &Connection, account_id: i64) -> Result<usize, StoreError> {
    let removed = conn.execute("DELETE FROM api_keys WHERE account_id = ?1", [account_id])?;
    tracing::info!(account_id, removed, "api keys revoked");
    Ok(removed)
}
