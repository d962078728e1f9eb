//! Generic CRUD repository over an [`EntitySet`] session.
//!
//! One `Repository` serves one entity type for the lifetime of one session
//! borrow.  It holds no entity state of its own: every operation is a single
//! stage → commit against the session.
//!
//! Failure policy differs by operation:
//! - `get_by_id` and `create` log the fault and hand it back to the caller,
//!   who must be able to tell a broken store from a missing row.
//! - `update` and `delete` log the fault and report `false`; the cause only
//!   reaches the log.
//! - `list_all` propagates faults without logging.
//!
//! Every failure path emits exactly one `error!` event.

use std::marker::PhantomData;

use tracing::{error, instrument};

use crate::{
    DbError,
    models::{EntityId, Record},
    session::{EntitySet, SaveOutcome},
};

pub struct Repository<'s, E, S> {
    session: &'s mut S,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E, S> Repository<'s, E, S>
where
    E: Record,
    S: EntitySet<E>,
{
    pub fn new(session: &'s mut S) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    /// Every stored entity, in whatever order the store returns them.
    #[instrument(skip(self), fields(entity = E::NAME))]
    pub async fn list_all(&mut self) -> Result<Vec<E>, DbError> {
        self.session.list().await
    }

    /// The entity stored under `id`, or `None` when there is none.
    ///
    /// # Errors
    /// Returns the store fault after logging it.
    #[instrument(skip(self), fields(entity = E::NAME))]
    pub async fn get_by_id(&mut self, id: EntityId) -> Result<Option<E>, DbError> {
        self.session.find(id).await.map_err(|err| {
            error!(entity = E::NAME, id, error = %err, "failed to fetch {} with id {}", E::NAME, id);
            err
        })
    }

    /// Persist `entity` and return it with its store-assigned key.
    ///
    /// # Errors
    /// Returns the store fault after logging it; nothing was persisted.
    #[instrument(skip(self, entity), fields(entity = E::NAME))]
    pub async fn create(&mut self, mut entity: E) -> Result<E, DbError> {
        match self.try_create(&entity).await {
            Ok(outcome) => {
                if let Some(&id) = outcome.inserted.first() {
                    entity.set_id(id);
                }
                Ok(entity)
            }
            Err(err) => {
                error!(entity = E::NAME, error = %err, "failed to create {}", E::NAME);
                Err(err)
            }
        }
    }

    /// Overwrite the stored row whose key matches `entity`.
    ///
    /// Returns `false` on any store fault, including a key that matches no row.
    #[instrument(skip(self, entity), fields(entity = E::NAME, id = entity.id()))]
    pub async fn update(&mut self, entity: &E) -> bool {
        match self.try_update(entity).await {
            Ok(()) => true,
            Err(err) => {
                error!(entity = E::NAME, id = entity.id(), error = %err, "failed to update {}", E::NAME);
                false
            }
        }
    }

    /// Remove the entity stored under `id`.
    ///
    /// Returns `false` when there is no such entity (without logging) or
    /// when the store faults.
    #[instrument(skip(self), fields(entity = E::NAME))]
    pub async fn delete(&mut self, id: EntityId) -> bool {
        match self.try_delete(id).await {
            Ok(deleted) => deleted,
            Err(err) => {
                error!(entity = E::NAME, id, error = %err, "failed to delete {} with id {}", E::NAME, id);
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal: stage → commit, faults bubble up to the public wrappers.
    // -----------------------------------------------------------------------

    async fn try_create(&mut self, entity: &E) -> Result<SaveOutcome, DbError> {
        self.session.add(entity).await?;
        self.session.save_changes().await
    }

    async fn try_update(&mut self, entity: &E) -> Result<(), DbError> {
        self.session.update(entity)?;
        self.session.save_changes().await?;
        Ok(())
    }

    async fn try_delete(&mut self, id: EntityId) -> Result<bool, DbError> {
        let Some(entity) = self.session.find(id).await? else {
            return Ok(false);
        };

        self.session.remove(&entity)?;
        self.session.save_changes().await?;
        Ok(true)
    }
}
