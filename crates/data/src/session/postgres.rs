//! Postgres session backed by a shared `sqlx` pool.
//!
//! Reads run directly on the pool.  Writes are kept as prepared
//! `QueryBuilder`s and replayed inside one transaction by `save_changes`.

use async_trait::async_trait;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, QueryBuilder};
use tracing::debug;

use crate::{
    DbError,
    models::{EntityId, InventoryMovement, Record, RoleForm},
    pool::DbPool,
    session::{EntitySet, SaveOutcome, UnitOfWork},
};

/// Table mapping for a [`Record`].  The key column is always `id`.
pub trait PgRecord: Record + for<'r> FromRow<'r, PgRow> {
    const TABLE: &'static str;
    /// Every column except `id`, in the order `push_values` binds them.
    const COLUMNS: &'static [&'static str];

    fn push_values(&self, values: &mut Separated<'_, 'static, Postgres, &'static str>);
}

// ---------------------------------------------------------------------------
// Table mappings
// ---------------------------------------------------------------------------

impl PgRecord for RoleForm {
    const TABLE: &'static str = "role_forms";
    const COLUMNS: &'static [&'static str] = &[
        "role_id",
        "form_id",
        "can_create",
        "can_read",
        "can_update",
        "can_delete",
    ];

    fn push_values(&self, values: &mut Separated<'_, 'static, Postgres, &'static str>) {
        values
            .push_bind(self.role_id)
            .push_bind(self.form_id)
            .push_bind(self.can_create)
            .push_bind(self.can_read)
            .push_bind(self.can_update)
            .push_bind(self.can_delete);
    }
}

impl PgRecord for InventoryMovement {
    const TABLE: &'static str = "inventory_movements";
    const COLUMNS: &'static [&'static str] = &[
        "quantity",
        "date",
        "description",
        "movement_type",
        "inventory_id",
        "product_id",
    ];

    fn push_values(&self, values: &mut Separated<'_, 'static, Postgres, &'static str>) {
        values
            .push_bind(self.quantity.clone())
            .push_bind(self.date)
            .push_bind(self.description.clone())
            .push_bind(self.movement_type)
            .push_bind(self.inventory_id)
            .push_bind(self.product_id);
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

fn select_sql<E: PgRecord>() -> String {
    format!("SELECT id, {} FROM {}", E::COLUMNS.join(", "), E::TABLE)
}

fn insert_query<E: PgRecord>(entity: &E) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) VALUES (",
        E::TABLE,
        E::COLUMNS.join(", ")
    ));
    {
        let mut values = query.separated(", ");
        entity.push_values(&mut values);
    }
    query.push(") RETURNING id");
    query
}

fn update_query<E: PgRecord>(entity: &E) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "UPDATE {} SET ({}) = ROW(",
        E::TABLE,
        E::COLUMNS.join(", ")
    ));
    {
        let mut values = query.separated(", ");
        entity.push_values(&mut values);
    }
    query.push(") WHERE id = ").push_bind(entity.id());
    query
}

fn delete_query<E: PgRecord>(id: EntityId) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("DELETE FROM {} WHERE id = ", E::TABLE));
    query.push_bind(id);
    query
}

// ---------------------------------------------------------------------------
// PgSession
// ---------------------------------------------------------------------------

enum Staged {
    /// Yields the new key through `RETURNING id`.
    Insert(QueryBuilder<'static, Postgres>),
    /// Must touch at least one row or the commit is rolled back.
    Write {
        entity: &'static str,
        id: EntityId,
        query: QueryBuilder<'static, Postgres>,
    },
}

/// Session scoped to one logical request.
pub struct PgSession {
    pool: DbPool,
    staged: Vec<Staged>,
}

impl PgSession {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            staged: Vec::new(),
        }
    }

    /// Number of changes staged and not yet committed.
    pub fn pending(&self) -> usize {
        self.staged.len()
    }
}

#[async_trait]
impl UnitOfWork for PgSession {
    async fn save_changes(&mut self) -> Result<SaveOutcome, DbError> {
        let staged = std::mem::take(&mut self.staged);
        let mut outcome = SaveOutcome::default();

        // Dropping `tx` on an early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        for change in staged {
            match change {
                Staged::Insert(mut query) => {
                    let id: EntityId = query
                        .build_query_scalar::<EntityId>()
                        .fetch_one(&mut *tx)
                        .await?;
                    outcome.inserted.push(id);
                    outcome.affected += 1;
                }
                Staged::Write { entity, id, mut query } => {
                    let done = query.build().execute(&mut *tx).await?;
                    if done.rows_affected() == 0 {
                        return Err(DbError::ConcurrencyConflict { entity, id });
                    }
                    outcome.affected += done.rows_affected();
                }
            }
        }

        tx.commit().await?;
        debug!(
            "committed {} row(s), {} insert(s)",
            outcome.affected,
            outcome.inserted.len()
        );

        Ok(outcome)
    }
}

#[async_trait]
impl<E: PgRecord> EntitySet<E> for PgSession {
    async fn find(&mut self, id: EntityId) -> Result<Option<E>, DbError> {
        let sql = format!("{} WHERE id = $1", select_sql::<E>());
        let row = sqlx::query_as::<_, E>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list(&mut self) -> Result<Vec<E>, DbError> {
        let sql = select_sql::<E>();
        let rows = sqlx::query_as::<_, E>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn add(&mut self, entity: &E) -> Result<(), DbError> {
        self.staged.push(Staged::Insert(insert_query(entity)));
        Ok(())
    }

    fn update(&mut self, entity: &E) -> Result<(), DbError> {
        self.staged.push(Staged::Write {
            entity: E::NAME,
            id: entity.id(),
            query: update_query(entity),
        });
        Ok(())
    }

    fn remove(&mut self, entity: &E) -> Result<(), DbError> {
        self.staged.push(Staged::Write {
            entity: E::NAME,
            id: entity.id(),
            query: delete_query::<E>(entity.id()),
        });
        Ok(())
    }
}
