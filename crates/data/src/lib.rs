//! `data` crate — generic repository over a transactional database session.
//!
//! Provides typed entity records, the session contract a store must offer,
//! a Postgres and an in-memory session, and the [`Repository`] that maps the
//! five CRUD operations onto them.  No business logic lives here.

pub mod clock;
pub mod error;
pub mod logging;
pub mod models;
pub mod pool;
pub mod repository;
pub mod session;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::DbError;
pub use models::{EntityId, InventoryMovement, MovementType, Record, RoleForm};
pub use pool::{DbConfig, DbPool};
pub use repository::Repository;
pub use session::{EntitySet, SaveOutcome, UnitOfWork};
