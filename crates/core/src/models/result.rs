//! Final room result

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Candidate, Influence};

/// Written exactly once per room, when the leader election resolves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomResult {
    pub room_id: Uuid,
    pub winner: Candidate,
    pub winning_weight: Influence,
    /// Weighted sum per candidate
    pub totals: BTreeMap<String, Influence>,
    /// Highest-scoring player
    pub mvp_user_id: Option<Uuid>,
    pub resolved_at: DateTime<Utc>,
}
