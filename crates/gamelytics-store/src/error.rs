//! Error types for the persistence layer.

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization of an opaque payload failed.
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity, e.g. `"game"`.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// An account with this email already exists.
    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    /// An ingestion request carried no events.
    #[error("empty list")]
    EmptyBatch,

    /// An ingestion request carried more events than one insert may hold.
    #[error("batch of {len} events exceeds the limit of {max}")]
    BatchTooLarge {
        /// Number of submitted events.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The first event of a batch names a session of another game.
    #[error("session {session_id} does not belong to game {game_id}")]
    ForeignSession {
        /// The session named by the batch.
        session_id: String,
        /// The game the caller is scoped to.
        game_id: i64,
    },

    /// A game-scoped caller asked for another game's events.
    #[error("requested game {requested} but credentials are scoped to game {authorized}")]
    GameMismatch {
        /// The `game` filter value supplied by the caller.
        requested: i64,
        /// The game the caller's API key is bound to.
        authorized: i64,
    },

    /// A filter value could not be used.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns `true` for the [`StoreError::NotFound`] variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
