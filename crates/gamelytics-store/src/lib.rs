//! Persistence and domain logic for Gamelytics.
//!
//! Every function in this crate takes a borrowed [`rusqlite::Connection`]
//! and performs one logical operation, usually a single SQL statement.
//! Connection acquisition, authorization and HTTP mapping live in
//! `gamelytics-server`.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`accounts`] | publisher/admin accounts and login tokens |
//! | [`credentials`] | password hashing, token generation |
//! | [`keys`] | API key registry |
//! | [`games`] | game records |
//! | [`sessions`] | session lifecycle (open → closed) |
//! | [`events`] | event rows and batch inserts |
//! | [`ingest`] | single/batch event ingestion |
//! | [`query`] | filtered, scoped, paginated event reads |

pub mod accounts;
pub mod credentials;
mod error;
pub mod events;
pub mod games;
pub mod ingest;
pub mod keys;
pub mod query;
pub mod sessions;

pub use accounts::{Account, NewAccount, UpdateAccountParams};
pub use error::StoreError;
pub use events::Event;
pub use games::{Game, NewGame, UpdateGameParams};
pub use ingest::{EventInput, EventSubmission};
pub use keys::{ApiKey, KeyGrant};
pub use query::{EventFilter, EventScope, Page};
pub use sessions::{Session, SessionAttrs, SessionPatch};

use chrono::{SecondsFormat, Utc};

/// Returns the current time as an RFC 3339 UTC string with millisecond
/// precision, the format every timestamp column uses.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decodes a JSON text column, falling back to an empty object for rows
/// written with malformed payloads.
pub(crate) fn json_column(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "stored json column could not be decoded");
        serde_json::Value::Object(serde_json::Map::new())
    })
}

/// Returns `true` when `err` is a UNIQUE/CHECK/FOREIGN KEY constraint failure.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ffi::ErrorCode::ConstraintViolation
    )
}
