//! Chapter model - one narrative voting round

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chapter seeded into a room from the catalog. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Uuid,
    pub room_id: Uuid,
    /// 1-based position in the catalog
    pub order: u32,
    pub title: String,
    pub description: String,
    pub option_a_label: String,
    pub option_b_label: String,
}
