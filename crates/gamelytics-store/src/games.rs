//! Game records owned by a publishing account.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{json_column, StoreError};

/// A published game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    /// Account that owns the game.
    pub publisher_id: i64,
    pub name: String,
    pub author: Option<String>,
    pub description: Option<String>,
    /// Opaque publisher payload.
    pub custom_data: Value,
    pub created_at: String,
}

/// Parameters for creating a game.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewGame {
    #[serde(default)]
    pub name: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub custom_data: Option<Value>,
}

/// Partial update of a game. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGameParams {
    pub name: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub custom_data: Option<Value>,
}

const GAME_COLUMNS: &str = "id, publisher_id, name, author, description, custom_data, created_at";

fn map_row_to_game(row: &Row) -> rusqlite::Result<Game> {
    let custom_data: String = row.get(5)?;
    Ok(Game {
        id: row.get(0)?,
        publisher_id: row.get(1)?,
        name: row.get(2)?,
        author: row.get(3)?,
        description: row.get(4)?,
        custom_data: json_column(&custom_data),
        created_at: row.get(6)?,
    })
}

fn encode_custom_data(value: Option<&Value>) -> Result<String, StoreError> {
    match value {
        Some(v) => Ok(serde_json::to_string(v)?),
        None => Ok("{}".to_string()),
    }
}

/// Creates a game published by `publisher_id`.
pub fn create_game(conn: &Connection, publisher_id: i64, game: &NewGame) -> Result<Game, StoreError> {
    let custom_data = encode_custom_data(game.custom_data.as_ref())?;
    conn.execute(
        "INSERT INTO games (publisher_id, name, author, description, custom_data)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            publisher_id,
            game.name,
            game.author,
            game.description,
            custom_data
        ],
    )?;

    let game = get_game(conn, conn.last_insert_rowid())?;
    tracing::info!(game_id = game.id, publisher_id, "game created");
    Ok(game)
}

/// Retrieves a game by ID.
pub fn get_game(conn: &Connection, id: i64) -> Result<Game, StoreError> {
    conn.query_row(
        &format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?1"),
        [id],
        map_row_to_game,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("game", id))
}

/// Lists games, optionally restricted to one publisher.
pub fn list_games(conn: &Connection, publisher_id: Option<i64>) -> Result<Vec<Game>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GAME_COLUMNS} FROM games
         WHERE ?1 IS NULL OR publisher_id = ?1
         ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map([publisher_id], map_row_to_game)?;
    let mut games = Vec::new();
    for row in rows {
        games.push(row?);
    }
    Ok(games)
}

/// Applies a partial update in a single UPDATE statement.
pub fn update_game(conn: &Connection, id: i64, updates: &UpdateGameParams) -> Result<Game, StoreError> {
    let custom_data = updates
        .custom_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let changed = conn.execute(
        "UPDATE games SET
            name = COALESCE(?1, name),
            author = COALESCE(?2, author),
            description = COALESCE(?3, description),
            custom_data = COALESCE(?4, custom_data)
         WHERE id = ?5",
        params![
            updates.name,
            updates.author,
            updates.description,
            custom_data,
            id
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("game", id));
    }

    get_game(conn, id)
}

/// Deletes a game together with its keys, sessions and events.
pub fn delete_game(conn: &Connection, id: i64) -> Result<(), StoreError> {
    let changed = conn.execute("DELETE FROM games WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(StoreError::not_found("game", id));
    }
    tracing::info!(game_id = id, "game deleted");
    Ok(())
}
