//! Session lifecycle manager.
//!
//! A session is one play/run of a game and the container for its events.
//! Sessions start open (`closed = false`) and may be closed through a
//! patch. Closing is terminal: a later patch with `closed: false` does not
//! reopen the session.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::games::get_game;
use crate::query::Page;
use crate::{json_column, now_timestamp, StoreError};

/// A game-client session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub game_id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub closed: bool,
    pub platform: Option<String>,
    pub screen_size: Option<String>,
    pub software: Option<String>,
    pub external_id: Option<String>,
    pub version: Option<String>,
    pub custom_data: Value,
}

/// Client-supplied attributes for a new session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionAttrs {
    pub platform: Option<String>,
    pub screen_size: Option<String>,
    pub software: Option<String>,
    pub external_id: Option<String>,
    pub version: Option<String>,
    pub custom_data: Option<Value>,
}

/// Partial update of a session. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPatch {
    pub platform: Option<String>,
    pub screen_size: Option<String>,
    pub software: Option<String>,
    pub external_id: Option<String>,
    pub version: Option<String>,
    pub custom_data: Option<Value>,
    pub closed: Option<bool>,
}

const SESSION_COLUMNS: &str = "id, game_id, created_at, updated_at, closed, platform, \
     screen_size, software, external_id, version, custom_data";

fn map_row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let custom_data: String = row.get(10)?;
    Ok(Session {
        id: row.get(0)?,
        game_id: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        closed: row.get(4)?,
        platform: row.get(5)?,
        screen_size: row.get(6)?,
        software: row.get(7)?,
        external_id: row.get(8)?,
        version: row.get(9)?,
        custom_data: json_column(&custom_data),
    })
}

/// Opens a new session for `game_id`.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if the game does not exist.
pub fn create_session(
    conn: &Connection,
    game_id: i64,
    attrs: &SessionAttrs,
) -> Result<Session, StoreError> {
    get_game(conn, game_id)?;

    let now = now_timestamp();
    let custom_data = attrs
        .custom_data
        .clone()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    let session = Session {
        id: uuid::Uuid::new_v4().to_string(),
        game_id,
        created_at: now.clone(),
        updated_at: now,
        closed: false,
        platform: attrs.platform.clone(),
        screen_size: attrs.screen_size.clone(),
        software: attrs.software.clone(),
        external_id: attrs.external_id.clone(),
        version: attrs.version.clone(),
        custom_data,
    };

    conn.execute(
        "INSERT INTO sessions (
            id, game_id, created_at, updated_at, closed,
            platform, screen_size, software, external_id, version, custom_data
        ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            session.id,
            session.game_id,
            session.created_at,
            session.updated_at,
            session.platform,
            session.screen_size,
            session.software,
            session.external_id,
            session.version,
            serde_json::to_string(&session.custom_data)?,
        ],
    )?;

    tracing::debug!(session_id = %session.id, game_id, "session opened");
    Ok(session)
}

/// Looks up a session, returning `None` if it does not exist.
pub fn find_session(conn: &Connection, id: &str) -> Result<Option<Session>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
            [id],
            map_row_to_session,
        )
        .optional()?)
}

/// Retrieves a session by ID.
pub fn get_session(conn: &Connection, id: &str) -> Result<Session, StoreError> {
    find_session(conn, id)?.ok_or_else(|| StoreError::not_found("session", id))
}

/// Applies a partial patch and refreshes `updated_at`, returning the
/// session ID.
///
/// `closed` only ever moves from open to closed.
pub fn update_session(
    conn: &Connection,
    id: &str,
    patch: &SessionPatch,
) -> Result<String, StoreError> {
    let custom_data = patch
        .custom_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let changed = conn.execute(
        "UPDATE sessions SET
            platform = COALESCE(?1, platform),
            screen_size = COALESCE(?2, screen_size),
            software = COALESCE(?3, software),
            external_id = COALESCE(?4, external_id),
            version = COALESCE(?5, version),
            custom_data = COALESCE(?6, custom_data),
            closed = (closed OR COALESCE(?7, 0)),
            updated_at = ?8
         WHERE id = ?9",
        params![
            patch.platform,
            patch.screen_size,
            patch.software,
            patch.external_id,
            patch.version,
            custom_data,
            patch.closed,
            now_timestamp(),
            id,
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("session", id));
    }

    Ok(id.to_string())
}

/// Returns `true` if `session` belongs to `game_id`.
pub fn belongs_to(game_id: i64, session: &Session) -> bool {
    session.game_id == game_id
}

/// Lists a game's sessions in creation order within `page`.
pub fn list_sessions_by_game(
    conn: &Connection,
    game_id: i64,
    page: &Page,
) -> Result<Vec<Session>, StoreError> {
    let (limit, offset) = page.limit_offset()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions
         WHERE game_id = ?1
         ORDER BY rowid ASC
         LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt.query_map(params![game_id, limit, offset], map_row_to_session)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }
    Ok(sessions)
}

/// Counts a game's sessions.
pub fn count_sessions_by_game(conn: &Connection, game_id: i64) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM sessions WHERE game_id = ?1",
        [game_id],
        |row| row.get(0),
    )?)
}
