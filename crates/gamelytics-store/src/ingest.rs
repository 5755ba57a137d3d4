//! Event ingestion pipeline.
//!
//! A submission is one event object or an array of them. The whole batch
//! is written against a single session, chosen from the first item only:
//! if its `session_id` names an existing session that session is reused,
//! otherwise a fresh session is opened for the caller's game. The
//! `session_id` of every later item is ignored.
//!
//! Two concurrent batches without a session for the same game may open two
//! sessions. Sessions are cheap, so no lock guards this.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::events::{insert_events, EncodedEvent, MAX_EVENTS_PER_INSERT};
use crate::sessions::{create_session, find_session, SessionAttrs};
use crate::{now_timestamp, StoreError};

/// One submitted event. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventInput {
    /// Target session. Only read on the first item of a batch.
    #[serde(default, deserialize_with = "lenient_id")]
    pub session_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub section: Option<String>,
    pub coordinates: Option<Value>,
    pub custom_data: Option<Value>,
    pub user_time: Option<Value>,
}

/// A request body for ingestion: a batch or a lone event.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EventSubmission {
    Batch(Vec<EventInput>),
    Single(EventInput),
}

impl EventSubmission {
    /// Flattens the submission into an ordered list of items.
    pub fn into_items(self) -> Vec<EventInput> {
        match self {
            Self::Batch(items) => items,
            Self::Single(item) => vec![item],
        }
    }
}

/// Accepts string or numeric session IDs; anything else counts as absent.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}

fn encode_payload(value: Option<&Value>) -> Result<String, StoreError> {
    match value {
        Some(v) => Ok(serde_json::to_string(v)?),
        None => Ok("{}".to_string()),
    }
}

fn encode(item: &EventInput) -> Result<EncodedEvent, StoreError> {
    Ok(EncodedEvent {
        event_type: item.event_type.clone(),
        section: item.section.clone(),
        user_time: item
            .user_time
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
        coordinates: encode_payload(item.coordinates.as_ref())?,
        custom_data: encode_payload(item.custom_data.as_ref())?,
    })
}

/// Picks the batch's session: the first item's session if it exists,
/// otherwise a new one for `game_id`.
fn resolve_session(
    conn: &rusqlite::Connection,
    game_id: i64,
    first: &EventInput,
) -> Result<String, StoreError> {
    if let Some(requested) = first.session_id.as_deref() {
        if let Some(session) = find_session(conn, requested)? {
            if session.game_id != game_id {
                return Err(StoreError::ForeignSession {
                    session_id: session.id,
                    game_id,
                });
            }
            return Ok(session.id);
        }
    }
    Ok(create_session(conn, game_id, &SessionAttrs::default())?.id)
}

/// Ingests `items` for `game_id` and returns the session they were
/// written to.
///
/// # Errors
///
/// - `StoreError::EmptyBatch` when `items` is empty.
/// - `StoreError::BatchTooLarge` when `items` exceeds `max_batch_size` or
///   [`MAX_EVENTS_PER_INSERT`], whichever is smaller.
/// - `StoreError::ForeignSession` when the first item names another game's
///   session.
pub fn ingest(
    conn: &rusqlite::Connection,
    game_id: i64,
    items: Vec<EventInput>,
    max_batch_size: usize,
) -> Result<String, StoreError> {
    let Some(first) = items.first() else {
        return Err(StoreError::EmptyBatch);
    };
    let max = max_batch_size.min(MAX_EVENTS_PER_INSERT);
    if items.len() > max {
        return Err(StoreError::BatchTooLarge {
            len: items.len(),
            max,
        });
    }

    // Encode before touching the database so a bad payload opens no session.
    let encoded = items.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
    let session_id = resolve_session(conn, game_id, first)?;
    let written = insert_events(conn, &session_id, &now_timestamp(), &encoded)?;

    tracing::debug!(game_id, session_id = %session_id, written, "events ingested");
    Ok(session_id)
}
