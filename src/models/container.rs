//! Represents a storage container — the top-level namespace for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage container.
///
/// Every user owns one container that receives their derivative images; the
/// raw-uploads container holds source images until the worker removes them.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Container {
    /// Unique identifier for this container (UUID for internal DB use).
    pub id: Uuid,

    /// Container name (DNS-like naming rules, see `StorageService`).
    pub name: String,

    /// When this container was created.
    pub created_at: DateTime<Utc>,
}
