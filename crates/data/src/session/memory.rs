//! `MemoryStore` — an in-process store and session for tests and demos.
//!
//! Rows are kept as JSON per entity name.  Commits work on a copy of the
//! tables and swap it in only when every staged change applied, so a failed
//! commit leaves the store untouched.  Any session operation can be made to
//! fail on demand to simulate a broken store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    DbError,
    models::{EntityId, Record},
    session::{EntitySet, SaveOutcome, UnitOfWork},
};

/// Session operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOp {
    Find,
    List,
    Add,
    Update,
    Remove,
    SaveChanges,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: HashMap<&'static str, BTreeMap<EntityId, Value>>,
    last_id: HashMap<&'static str, EntityId>,
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    faults: HashSet<SessionOp>,
    commits: usize,
}

/// Shared backing store.  Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh session (one per logical request).
    pub fn session(&self) -> MemorySession {
        MemorySession {
            store: self.clone(),
            staged: Vec::new(),
        }
    }

    /// Make every later `op` on any session fail with [`DbError::Store`].
    pub fn fail_on(&self, op: SessionOp) {
        self.lock().faults.insert(op);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Number of `save_changes` calls seen, successful or not.
    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    /// Committed row count for `E`.
    pub fn count<E: Record>(&self) -> usize {
        self.lock()
            .tables
            .rows
            .get(E::NAME)
            .map_or(0, BTreeMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, op: SessionOp) -> Result<(), DbError> {
        if self.lock().faults.contains(&op) {
            return Err(DbError::Store(format!("injected {op:?} fault")));
        }
        Ok(())
    }
}

/// A change waiting for the next commit.
#[derive(Debug)]
enum Staged {
    Insert { entity: &'static str, row: Value },
    Update { entity: &'static str, id: EntityId, row: Value },
    Remove { entity: &'static str, id: EntityId },
}

/// Session over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
    staged: Vec<Staged>,
}

impl MemorySession {
    /// Number of changes staged and not yet committed.
    pub fn pending(&self) -> usize {
        self.staged.len()
    }
}

fn apply(tables: &mut Tables, change: Staged, outcome: &mut SaveOutcome) -> Result<(), DbError> {
    match change {
        Staged::Insert { entity, row } => {
            let last = tables.last_id.entry(entity).or_insert(0);
            *last += 1;
            let id = *last;
            tables.rows.entry(entity).or_default().insert(id, row);
            outcome.inserted.push(id);
        }
        Staged::Update { entity, id, row } => {
            let slot = tables
                .rows
                .get_mut(entity)
                .and_then(|rows| rows.get_mut(&id))
                .ok_or(DbError::ConcurrencyConflict { entity, id })?;
            *slot = row;
        }
        Staged::Remove { entity, id } => {
            tables
                .rows
                .get_mut(entity)
                .and_then(|rows| rows.remove(&id))
                .ok_or(DbError::ConcurrencyConflict { entity, id })?;
        }
    }
    outcome.affected += 1;
    Ok(())
}

fn decode<E: Record>(id: EntityId, row: &Value) -> Result<E, DbError> {
    let mut entity: E = serde_json::from_value(row.clone())?;
    entity.set_id(id);
    Ok(entity)
}

#[async_trait]
impl UnitOfWork for MemorySession {
    async fn save_changes(&mut self) -> Result<SaveOutcome, DbError> {
        let staged = std::mem::take(&mut self.staged);

        let mut state = self.store.lock();
        state.commits += 1;
        if state.faults.contains(&SessionOp::SaveChanges) {
            return Err(DbError::Store("injected SaveChanges fault".into()));
        }

        let mut working = state.tables.clone();
        let mut outcome = SaveOutcome::default();
        for change in staged {
            apply(&mut working, change, &mut outcome)?;
        }

        state.tables = working;
        Ok(outcome)
    }
}

#[async_trait]
impl<E: Record> EntitySet<E> for MemorySession {
    async fn find(&mut self, id: EntityId) -> Result<Option<E>, DbError> {
        self.store.check(SessionOp::Find)?;
        let state = self.store.lock();
        state
            .tables
            .rows
            .get(E::NAME)
            .and_then(|rows| rows.get(&id))
            .map(|row| decode(id, row))
            .transpose()
    }

    async fn list(&mut self) -> Result<Vec<E>, DbError> {
        self.store.check(SessionOp::List)?;
        let state = self.store.lock();
        match state.tables.rows.get(E::NAME) {
            Some(rows) => rows.iter().map(|(id, row)| decode(*id, row)).collect(),
            None => Ok(Vec::new()),
        }
    }

    async fn add(&mut self, entity: &E) -> Result<(), DbError> {
        self.store.check(SessionOp::Add)?;
        self.staged.push(Staged::Insert {
            entity: E::NAME,
            row: serde_json::to_value(entity)?,
        });
        Ok(())
    }

    fn update(&mut self, entity: &E) -> Result<(), DbError> {
        self.store.check(SessionOp::Update)?;
        self.staged.push(Staged::Update {
            entity: E::NAME,
            id: entity.id(),
            row: serde_json::to_value(entity)?,
        });
        Ok(())
    }

    fn remove(&mut self, entity: &E) -> Result<(), DbError> {
        self.store.check(SessionOp::Remove)?;
        self.staged.push(Staged::Remove {
            entity: E::NAME,
            id: entity.id(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoleForm;

    #[tokio::test]
    async fn keys_start_at_one_and_are_not_reused() {
        let store = MemoryStore::new();
        let mut session = store.session();

        EntitySet::<RoleForm>::add(&mut session, &RoleForm::new(1, 1)).await.unwrap();
        EntitySet::<RoleForm>::add(&mut session, &RoleForm::new(1, 2)).await.unwrap();
        let outcome = session.save_changes().await.unwrap();
        assert_eq!(outcome.inserted, vec![1, 2]);
        assert_eq!(outcome.affected, 2);

        let second = EntitySet::<RoleForm>::find(&mut session, 2).await.unwrap().expect("row 2");
        session.remove(&second).unwrap();
        session.save_changes().await.unwrap();

        EntitySet::<RoleForm>::add(&mut session, &RoleForm::new(1, 3)).await.unwrap();
        let outcome = session.save_changes().await.unwrap();
        assert_eq!(outcome.inserted, vec![3]);
        assert_eq!(store.count::<RoleForm>(), 2);
    }

    #[tokio::test]
    async fn staged_changes_are_invisible_until_commit() {
        let store = MemoryStore::new();
        let mut session = store.session();

        EntitySet::<RoleForm>::add(&mut session, &RoleForm::new(1, 1)).await.unwrap();
        assert_eq!(session.pending(), 1);
        let listed = EntitySet::<RoleForm>::list(&mut session).await.unwrap();
        assert!(listed.is_empty());

        session.save_changes().await.unwrap();
        assert_eq!(session.pending(), 0);
        let listed = EntitySet::<RoleForm>::list(&mut session).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, 1);
    }

    #[tokio::test]
    async fn failed_commit_leaves_tables_untouched() {
        let store = MemoryStore::new();
        let mut session = store.session();

        // The insert is valid, the update targets a key that does not exist.
        let mut ghost = RoleForm::new(9, 9);
        ghost.id = 77;
        EntitySet::<RoleForm>::add(&mut session, &RoleForm::new(1, 1)).await.unwrap();
        session.update(&ghost).unwrap();

        let err = session.save_changes().await.unwrap_err();
        assert!(matches!(
            err,
            DbError::ConcurrencyConflict { entity: "RoleForm", id: 77 }
        ));
        assert_eq!(store.count::<RoleForm>(), 0);
        assert_eq!(session.pending(), 0);
    }

    #[tokio::test]
    async fn injected_faults_fail_the_matching_operation_only() {
        let store = MemoryStore::new();
        store.fail_on(SessionOp::Find);
        let mut session = store.session();

        let found = EntitySet::<RoleForm>::find(&mut session, 1).await;
        assert!(matches!(found, Err(DbError::Store(_))));
        let listed = EntitySet::<RoleForm>::list(&mut session).await;
        assert!(listed.is_ok());

        store.clear_faults();
        let found = EntitySet::<RoleForm>::find(&mut session, 1).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn sessions_from_one_store_share_rows() {
        let store = MemoryStore::new();
        let mut writer = store.session();
        let mut reader = store.session();

        EntitySet::<RoleForm>::add(&mut writer, &RoleForm::new(4, 2)).await.unwrap();
        writer.save_changes().await.unwrap();

        let row = EntitySet::<RoleForm>::find(&mut reader, 1).await.unwrap().expect("committed row");
        assert_eq!((row.role_id, row.form_id), (4, 2));
        assert_eq!(store.commits(), 1);
    }
}
