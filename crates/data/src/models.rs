//! Entity records that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: passive data consumed by the repository.
//! Foreign keys are plain ids; referential integrity belongs to the store.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::FromRow;

use crate::clock::Clock;

/// Surrogate key assigned by the store.  `0` means "not assigned yet".
pub type EntityId = i32;

/// Anything the generic repository can persist.
pub trait Record:
    std::fmt::Debug + Clone + Send + Sync + Unpin + Serialize + DeserializeOwned + 'static
{
    /// Entity name used in log records and errors.
    const NAME: &'static str;

    fn id(&self) -> EntityId;
    fn set_id(&mut self, id: EntityId);
}

// ---------------------------------------------------------------------------
// role_forms
// ---------------------------------------------------------------------------

/// Permissions a role holds on a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RoleForm {
    pub id: EntityId,
    pub role_id: EntityId,
    pub form_id: EntityId,
    pub can_create: bool,
    pub can_read: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl RoleForm {
    /// A read-only link between `role_id` and `form_id`, not yet persisted.
    pub fn new(role_id: EntityId, form_id: EntityId) -> Self {
        Self {
            id: 0,
            role_id,
            form_id,
            can_create: false,
            can_read: true,
            can_update: false,
            can_delete: false,
        }
    }
}

impl Record for RoleForm {
    const NAME: &'static str = "RoleForm";

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }
}

// ---------------------------------------------------------------------------
// inventory_movements
// ---------------------------------------------------------------------------

/// Direction of a stock movement, stored as its integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum MovementType {
    In = 0,
    Out = 1,
    Adjustment = 2,
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In         => write!(f, "in"),
            Self::Out        => write!(f, "out"),
            Self::Adjustment => write!(f, "adjustment"),
        }
    }
}

impl std::str::FromStr for MovementType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in"         => Ok(Self::In),
            "out"        => Ok(Self::Out),
            "adjustment" => Ok(Self::Adjustment),
            other        => Err(format!("unknown movement type: {other}")),
        }
    }
}

/// A quantity of a product moved in or out of an inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct InventoryMovement {
    pub id: EntityId,
    /// Kept as text, exactly as the store holds it.
    pub quantity: String,
    /// Set once at construction; updates leave it alone unless overwritten.
    pub date: DateTime<Utc>,
    pub description: String,
    pub movement_type: MovementType,
    pub inventory_id: EntityId,
    pub product_id: EntityId,
}

impl InventoryMovement {
    /// Build an unsaved movement stamped with `clock.now()`.
    pub fn new(
        quantity: impl Into<String>,
        description: impl Into<String>,
        movement_type: MovementType,
        inventory_id: EntityId,
        product_id: EntityId,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            id: 0,
            quantity: quantity.into(),
            date: clock.now(),
            description: description.into(),
            movement_type,
            inventory_id,
            product_id,
        }
    }
}

impl Record for InventoryMovement {
    const NAME: &'static str = "InventoryMovement";

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }
}
