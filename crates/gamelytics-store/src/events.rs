//! Event rows.
//!
//! Events are immutable once written. They are only created through
//! [`crate::ingest`], which writes a whole batch in one INSERT.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{json_column, StoreError};

/// One stored telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic ID; also the storage order.
    pub id: i64,
    pub session_id: String,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub section: Option<String>,
    /// Ingestion time, stamped by the server.
    pub server_time: String,
    /// Client clock value, stored verbatim.
    pub user_time: Option<Value>,
    pub coordinates: Value,
    pub custom_data: Value,
}

/// An event ready to be written: payloads already encoded as JSON text.
#[derive(Debug, Clone)]
pub(crate) struct EncodedEvent {
    pub event_type: Option<String>,
    pub section: Option<String>,
    pub user_time: Option<String>,
    pub coordinates: String,
    pub custom_data: String,
}

/// Columns selected for an event, qualified with the `e` alias used by
/// [`crate::query`].
pub(crate) const EVENT_COLUMNS: &str = "e.id, e.session_id, e.type, e.section, e.server_time, \
     e.user_time, e.coordinates, e.custom_data";

pub(crate) fn map_row_to_event(row: &Row) -> rusqlite::Result<Event> {
    let user_time: Option<String> = row.get(5)?;
    let coordinates: String = row.get(6)?;
    let custom_data: String = row.get(7)?;
    Ok(Event {
        id: row.get(0)?,
        session_id: row.get(1)?,
        event_type: row.get(2)?,
        section: row.get(3)?,
        server_time: row.get(4)?,
        user_time: user_time.as_deref().map(json_column),
        coordinates: json_column(&coordinates),
        custom_data: json_column(&custom_data),
    })
}

/// Bound parameters per inserted event row.
const INSERT_COLUMNS: usize = 7;

/// SQLite's default cap on bound parameters in one statement.
const SQLITE_MAX_VARIABLES: usize = 32_766;

/// Largest batch [`insert_events`] can write in one statement.
pub const MAX_EVENTS_PER_INSERT: usize = SQLITE_MAX_VARIABLES / INSERT_COLUMNS;

/// Writes `events` against `session_id` in a single multi-row INSERT.
///
/// Every row gets the same `server_time`. Returns the number of rows written.
/// Callers keep `events` within [`MAX_EVENTS_PER_INSERT`].
pub(crate) fn insert_events(
    conn: &Connection,
    session_id: &str,
    server_time: &str,
    events: &[EncodedEvent],
) -> Result<usize, StoreError> {
    if events.is_empty() {
        return Ok(0);
    }

    const COLUMNS: usize = INSERT_COLUMNS;
    let mut rows = Vec::with_capacity(events.len());
    let mut values: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(events.len() * COLUMNS);

    for (i, event) in events.iter().enumerate() {
        let base = i * COLUMNS;
        let placeholders: Vec<String> = (1..=COLUMNS).map(|n| format!("?{}", base + n)).collect();
        rows.push(format!("({})", placeholders.join(", ")));

        values.push(&session_id);
        values.push(&event.event_type);
        values.push(&event.section);
        values.push(&server_time);
        values.push(&event.user_time);
        values.push(&event.coordinates);
        values.push(&event.custom_data);
    }

    let sql = format!(
        "INSERT INTO events (session_id, type, section, server_time, user_time, coordinates, custom_data)
         VALUES {}",
        rows.join(", ")
    );
    Ok(conn.execute(&sql, values.as_slice())?)
}

/// Retrieves an event by ID.
pub fn get_event(conn: &Connection, id: i64) -> Result<Event, StoreError> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = ?1"),
        [id],
        map_row_to_event,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("event", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::{create_session, SessionAttrs};
    use crate::testutil::{seed_account, seed_game, test_db};
    use serde_json::json;

    fn encoded(kind: &str) -> EncodedEvent {
        EncodedEvent {
            event_type: Some(kind.to_string()),
            section: None,
            user_time: Some("\"12:00\"".to_string()),
            coordinates: r#"{"x":1}"#.to_string(),
            custom_data: "{}".to_string(),
        }
    }

    #[test]
    fn batch_insert_assigns_increasing_ids() {
        let conn = test_db();
        let a = seed_account(&conn, "a@example.com");
        let g = seed_game(&conn, a, "g");
        let s = create_session(&conn, g, &SessionAttrs::default()).expect("session");

        let written = insert_events(
            &conn,
            &s.id,
            "2026-01-01T00:00:00.000Z",
            &[encoded("a"), encoded("b"), encoded("c")],
        )
        .expect("insert");
        assert_eq!(written, 3);

        let last = conn.last_insert_rowid();
        let first = get_event(&conn, last - 2).expect("first event");
        let third = get_event(&conn, last).expect("third event");
        assert_eq!(first.event_type.as_deref(), Some("a"));
        assert_eq!(third.event_type.as_deref(), Some("c"));
        assert_eq!(third.session_id, s.id);
        assert_eq!(third.user_time, Some(json!("12:00")));
        assert_eq!(third.coordinates, json!({"x": 1}));
    }

    #[test]
    fn events_need_an_existing_session() {
        let conn = test_db();
        let err = insert_events(&conn, "ghost", "2026-01-01T00:00:00.000Z", &[encoded("a")])
            .expect_err("foreign key should fail");
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn missing_event_is_not_found() {
        let conn = test_db();
        assert!(get_event(&conn, 1).expect_err("missing").is_not_found());
    }
}
