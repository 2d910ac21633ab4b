//! Player model - a user's seat in a room

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Influence;

/// A user's membership in a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub nickname: String,
    /// Never decreases while the room is active
    pub score: Influence,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    pub fn new(room_id: Uuid, user_id: Uuid, nickname: String) -> Self {
        Self {
            room_id,
            user_id,
            nickname,
            score: Influence::ZERO,
            joined_at: Utc::now(),
        }
    }
}

/// Player listing entry with host flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub user_id: Uuid,
    pub nickname: String,
    pub score: Influence,
    pub is_host: bool,
}

/// A reward to be added to several players' scores as one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCredit {
    pub user_ids: Vec<Uuid>,
    pub amount: Influence,
}

impl ScoreCredit {
    pub fn new(user_ids: Vec<Uuid>, amount: Influence) -> Self {
        Self { user_ids, amount }
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty() || self.amount == Influence::ZERO
    }
}
