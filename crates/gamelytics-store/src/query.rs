//! Query/filter engine over stored events.
//!
//! A read is the AND of the caller's optional filters plus an
//! [`EventScope`] derived from who is asking. Every query joins
//! `events → sessions → games`, so game and publisher constraints apply
//! uniformly. Results come back in storage (ID) order.
//!
//! There is no default page size: without `offset`/`count` a query returns
//! every matching row.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::ToSql;
use rusqlite::Connection;
use serde::Deserialize;

use crate::events::{map_row_to_event, Event, EVENT_COLUMNS};
use crate::StoreError;

/// An optional `offset`/`count` window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Page {
    pub offset: Option<i64>,
    pub count: Option<i64>,
}

impl Page {
    /// Returns `(limit, offset)` for SQL, where a limit of `-1` means
    /// unbounded.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidFilter` for negative values.
    pub fn limit_offset(&self) -> Result<(i64, i64), StoreError> {
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(StoreError::InvalidFilter(format!(
                "offset must not be negative, got {offset}"
            )));
        }
        match self.count {
            Some(count) if count < 0 => Err(StoreError::InvalidFilter(format!(
                "count must not be negative, got {count}"
            ))),
            Some(count) => Ok((count, offset)),
            None => Ok((-1, offset)),
        }
    }
}

/// Caller-supplied event filters. All are optional and AND-combined.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Game the event's session belongs to.
    pub game: Option<i64>,
    /// Exact session ID.
    pub session: Option<String>,
    /// Exact event type.
    pub event_type: Option<String>,
    /// Exact section. Matches the full value only, not sub-sections.
    pub section: Option<String>,
    /// Exclusive lower bound on `server_time` (RFC 3339).
    pub after: Option<String>,
    /// Exclusive upper bound on `server_time` (RFC 3339).
    pub before: Option<String>,
    pub page: Page,
}

/// What the caller is allowed to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    /// Administrators read everything.
    Unrestricted,
    /// API-key callers read only the key's game.
    Game(i64),
    /// Logged-in publishers read only games they publish.
    Publisher(i64),
}

impl EventScope {
    /// Reconciles `filter` with this scope.
    ///
    /// For [`EventScope::Game`], a missing `game` filter is pinned to the
    /// scoped game and a different one is refused.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::GameMismatch` naming both game IDs.
    pub fn constrain(&self, mut filter: EventFilter) -> Result<EventFilter, StoreError> {
        if let EventScope::Game(authorized) = *self {
            match filter.game {
                Some(requested) if requested != authorized => {
                    return Err(StoreError::GameMismatch {
                        requested,
                        authorized,
                    });
                }
                _ => filter.game = Some(authorized),
            }
        }
        Ok(filter)
    }
}

/// Parses an RFC 3339 timestamp and renders it in the stored format so it
/// compares correctly against `server_time`.
///
/// # Errors
///
/// Returns `StoreError::InvalidFilter` if `raw` is not RFC 3339.
pub fn normalize_timestamp(raw: &str) -> Result<String, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| {
            t.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        })
        .map_err(|e| StoreError::InvalidFilter(format!("invalid timestamp {raw:?}: {e}")))
}

struct WhereClause {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
}

fn build_where(filter: &EventFilter, scope: &EventScope) -> Result<WhereClause, StoreError> {
    let filter = scope.constrain(filter.clone())?;

    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    let mut push = |column: &str, op: &str, value: Box<dyn ToSql>| {
        params.push(value);
        clauses.push(format!("{column} {op} ?{}", params.len()));
    };

    if let EventScope::Publisher(account_id) = *scope {
        push("g.publisher_id", "=", Box::new(account_id));
    }
    if let Some(game) = filter.game {
        push("s.game_id", "=", Box::new(game));
    }
    if let Some(session) = filter.session {
        push("e.session_id", "=", Box::new(session));
    }
    if let Some(event_type) = filter.event_type {
        push("e.type", "=", Box::new(event_type));
    }
    if let Some(section) = filter.section {
        push("e.section", "=", Box::new(section));
    }
    if let Some(after) = filter.after.as_deref() {
        push("e.server_time", ">", Box::new(normalize_timestamp(after)?));
    }
    if let Some(before) = filter.before.as_deref() {
        push("e.server_time", "<", Box::new(normalize_timestamp(before)?));
    }

    let sql = if clauses.is_empty() {
        "1 = 1".to_string()
    } else {
        clauses.join(" AND ")
    };
    Ok(WhereClause { sql, params })
}

const EVENT_JOIN: &str = "events e
     JOIN sessions s ON s.id = e.session_id
     JOIN games g ON g.id = s.game_id";

/// Returns the events matching `filter` within `scope`, in storage order.
///
/// # Errors
///
/// Returns `StoreError::GameMismatch` or `StoreError::InvalidFilter` for
/// unusable filters, `StoreError::Database` on SQL failure.
pub fn query_events(
    conn: &Connection,
    filter: &EventFilter,
    scope: &EventScope,
) -> Result<Vec<Event>, StoreError> {
    let WhereClause { sql: where_sql, mut params } = build_where(filter, scope)?;

    let mut sql = format!(
        "SELECT {EVENT_COLUMNS} FROM {EVENT_JOIN}
         WHERE {where_sql}
         ORDER BY e.id ASC"
    );
    if filter.page.offset.is_some() || filter.page.count.is_some() {
        let (limit, offset) = filter.page.limit_offset()?;
        params.push(Box::new(limit));
        params.push(Box::new(offset));
        sql.push_str(&format!(" LIMIT ?{} OFFSET ?{}", params.len() - 1, params.len()));
    }

    let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| &**p).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), map_row_to_event)?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

/// Counts the events matching `filter` within `scope`, ignoring the page.
pub fn count_events(
    conn: &Connection,
    filter: &EventFilter,
    scope: &EventScope,
) -> Result<i64, StoreError> {
    let WhereClause { sql: where_sql, params } = build_where(filter, scope)?;
    let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| &**p).collect();
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) FROM {EVENT_JOIN} WHERE {where_sql}"),
        params_refs.as_slice(),
        |row| row.get(0),
    )?)
}
