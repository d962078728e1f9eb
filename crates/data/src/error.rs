//! Typed error type for the data crate.

use thiserror::Error;

use crate::models::EntityId;

/// A store fault: any failure originating from the session rather than from
/// application logic.  A missing entity is never a `DbError`.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Fault raised by a session that is not backed by sqlx.
    #[error("store fault: {0}")]
    Store(String),

    /// A staged update or removal matched no row when it was committed.
    #[error("{entity} {id} was changed or removed concurrently")]
    ConcurrencyConflict {
        entity: &'static str,
        id: EntityId,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
