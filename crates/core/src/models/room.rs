//! Room model - one instance of the game

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capacities a room may be created with. All odd, so a full room never
/// splits a plain majority vote evenly.
pub const ALLOWED_CAPACITIES: [u32; 4] = [3, 5, 7, 9];

/// Room lifecycle phase. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    Playing,
    FinalVote,
    Resolved,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Waiting => "WAITING",
            RoomStatus::Playing => "PLAYING",
            RoomStatus::FinalVote => "FINAL_VOTE",
            RoomStatus::Resolved => "RESOLVED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "WAITING" => Some(RoomStatus::Waiting),
            "PLAYING" => Some(RoomStatus::Playing),
            "FINAL_VOTE" => Some(RoomStatus::FinalVote),
            "RESOLVED" => Some(RoomStatus::Resolved),
            _ => None,
        }
    }

    /// Whether `next` is a legal successor of this phase
    pub fn can_advance_to(&self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Waiting, RoomStatus::Playing)
                | (RoomStatus::Playing, RoomStatus::Playing)
                | (RoomStatus::Playing, RoomStatus::FinalVote)
                | (RoomStatus::FinalVote, RoomStatus::Resolved)
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == RoomStatus::Resolved
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A game room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub host_user_id: Uuid,
    pub capacity: u32,
    pub status: RoomStatus,
    /// Only meaningful while `status` is `Playing`
    pub current_chapter_order: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Compare-and-swap token, bumped on every guarded transition
    pub version: u64,
}

impl Room {
    pub fn new(host_user_id: Uuid, capacity: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            host_user_id,
            capacity,
            status: RoomStatus::Waiting,
            current_chapter_order: None,
            created_at: Utc::now(),
            started_at: None,
            resolved_at: None,
            version: 0,
        }
    }

    pub fn is_host(&self, user_id: Uuid) -> bool {
        self.host_user_id == user_id
    }
}

/// Snapshot of a room's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub room_id: Uuid,
    pub phase: RoomStatus,
    pub current_chapter_order: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<&Room> for GameState {
    fn from(room: &Room) -> Self {
        Self {
            room_id: room.id,
            phase: room.status,
            current_chapter_order: room.current_chapter_order,
            started_at: room.started_at,
            resolved_at: room.resolved_at,
        }
    }
}

/// Lobby listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: Uuid,
    pub status: RoomStatus,
    pub capacity: u32,
    pub current_players: u32,
    pub created_at: DateTime<Utc>,
}

/// Lobby listing filters
#[derive(Debug, Clone, Default)]
pub struct RoomFilter {
    pub status: Option<RoomStatus>,
    pub min_players: Option<u32>,
    pub only_joinable: bool,
}
