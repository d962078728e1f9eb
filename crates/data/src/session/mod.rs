//! The session contract — what the repository needs from a store.
//!
//! A session is a transactional handle scoped to one logical request.  It
//! offers typed set access per entity ([`EntitySet`]) and a single commit
//! ([`UnitOfWork::save_changes`]) that applies everything staged so far.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    DbError,
    models::{EntityId, Record},
};

pub use memory::{MemorySession, MemoryStore, SessionOp};
pub use postgres::{PgRecord, PgSession};

/// What a successful commit did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Keys assigned to staged inserts, in staging order.
    pub inserted: Vec<EntityId>,
    /// Rows written in total.
    pub affected: u64,
}

/// Commit half of a session.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Apply every staged change in one all-or-nothing transaction.
    ///
    /// Staged changes are discarded whether or not the commit succeeds.
    async fn save_changes(&mut self) -> Result<SaveOutcome, DbError>;
}

/// Typed access to the rows of one entity.
///
/// Reads go straight to the store; writes are staged until
/// [`UnitOfWork::save_changes`].
#[async_trait]
pub trait EntitySet<E: Record>: UnitOfWork {
    async fn find(&mut self, id: EntityId) -> Result<Option<E>, DbError>;

    async fn list(&mut self) -> Result<Vec<E>, DbError>;

    /// Stage an insert.  The key of `entity` is ignored; the store assigns one.
    async fn add(&mut self, entity: &E) -> Result<(), DbError>;

    /// Stage a full-state update of the row whose key matches `entity`.
    fn update(&mut self, entity: &E) -> Result<(), DbError>;

    /// Stage removal of the row whose key matches `entity`.
    fn remove(&mut self, entity: &E) -> Result<(), DbError>;
}
