//! User domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A platform user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub username: String,
    pub email: String,
}
