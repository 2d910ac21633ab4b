//! Storage repository traits
//!
//! These traits define the storage interface the engines are written
//! against, allowing for different implementations (SQLite, mock,
//! future networked store). Every guarded transition is expressed as a
//! versioned compare-and-swap so the at-most-once guarantee does not
//! depend on any particular engine's row-locking behaviour.

use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Chapter, ChapterResolution, ChapterVote, LeaderVote, Player, Room, RoomFilter, RoomResult,
    RoomSummary, ScoreCredit,
};

/// Result of a guarded (compare-and-swap) update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The expected version held and the batch committed
    Applied,
    /// Another writer moved the room first; nothing was written
    Stale,
}

impl CasOutcome {
    pub fn is_applied(&self) -> bool {
        *self == CasOutcome::Applied
    }
}

/// Everything a chapter resolution commits in one guarded batch
#[derive(Debug, Clone)]
pub struct ChapterCommit {
    pub room_id: Uuid,
    /// Room version observed at the start of the resolve call
    pub expected_version: u64,
    /// Chapter order observed at the start of the resolve call
    pub expected_order: u32,
    /// `None` once the catalog is exhausted; the room then enters the final vote
    pub next_order: Option<u32>,
    pub resolution: ChapterResolution,
    pub credit: ScoreCredit,
}

/// Room repository operations
pub trait RoomRepository {
    /// Create a room and seat its host in one transaction
    fn create_room(&self, room: &Room, host: &Player) -> Result<()>;

    /// Find room by ID
    fn find_room(&self, id: Uuid) -> Result<Option<Room>>;

    /// List unresolved rooms for the lobby
    fn list_rooms(&self, filter: &RoomFilter) -> Result<Vec<RoomSummary>>;

    /// Seed the catalog (if not yet seeded) and move WAITING -> PLAYING at chapter 1
    fn start_room(&self, room_id: Uuid, expected_version: u64, catalog: &[Chapter])
        -> Result<CasOutcome>;

    /// Record a chapter outcome, credit the winners and advance the room
    fn commit_chapter_resolution(&self, commit: &ChapterCommit) -> Result<CasOutcome>;

    /// Persist the final result and move FINAL_VOTE -> RESOLVED
    fn commit_final_resolution(&self, expected_version: u64, result: &RoomResult)
        -> Result<CasOutcome>;
}

/// Player repository operations
pub trait PlayerRepository {
    /// Seat a player if the room is still waiting and has a free seat.
    ///
    /// Returns `false` when the guard rejected the insert. A second seat for
    /// the same user surfaces as a unique violation.
    fn add_player(&self, player: &Player) -> Result<bool>;

    /// Find a player by room and user
    fn find_player(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Player>>;

    /// List players in join order
    fn list_players(&self, room_id: Uuid) -> Result<Vec<Player>>;

    /// Count seated players
    fn count_players(&self, room_id: Uuid) -> Result<u32>;

    /// Add the same amount to several players, all or nothing
    fn increment_scores(&self, room_id: Uuid, credit: &ScoreCredit) -> Result<()>;
}

/// Chapter repository operations
pub trait ChapterRepository {
    /// List a room's chapters in order
    fn list_chapters(&self, room_id: Uuid) -> Result<Vec<Chapter>>;

    /// Find chapter by ID within a room
    fn find_chapter(&self, room_id: Uuid, chapter_id: Uuid) -> Result<Option<Chapter>>;

    /// Find chapter by catalog position
    fn find_chapter_by_order(&self, room_id: Uuid, order: u32) -> Result<Option<Chapter>>;

    /// List recorded chapter outcomes in resolution order
    fn list_resolutions(&self, room_id: Uuid) -> Result<Vec<ChapterResolution>>;
}

/// Vote repository operations
pub trait VoteRepository {
    /// Insert a chapter vote while its chapter is the active one.
    ///
    /// Returns `false` when the room has moved past the chapter. Duplicates
    /// surface as a unique violation.
    fn insert_chapter_vote(&self, vote: &ChapterVote) -> Result<bool>;

    /// List votes for a chapter
    fn list_chapter_votes(&self, room_id: Uuid, chapter_id: Uuid) -> Result<Vec<ChapterVote>>;

    /// Count votes for a chapter
    fn count_chapter_votes(&self, room_id: Uuid, chapter_id: Uuid) -> Result<u32>;

    /// Insert a leader vote while the room is in FINAL_VOTE.
    ///
    /// Returns `false` when the room is in any other phase. Duplicates
    /// surface as a unique violation.
    fn insert_leader_vote(&self, vote: &LeaderVote) -> Result<bool>;

    /// List leader votes for a room
    fn list_leader_votes(&self, room_id: Uuid) -> Result<Vec<LeaderVote>>;

    /// Count leader votes for a room
    fn count_leader_votes(&self, room_id: Uuid) -> Result<u32>;
}

/// Result repository operations
pub trait ResultRepository {
    /// Find the final result of a room
    fn find_result(&self, room_id: Uuid) -> Result<Option<RoomResult>>;
}

/// Combined storage interface
///
/// Provides access to all repository operations.
/// Implementations may be backed by SQLite, mocks, or network.
pub trait Storage:
    RoomRepository + PlayerRepository + ChapterRepository + VoteRepository + ResultRepository
{
}

// Blanket implementation: any type implementing all traits implements Storage
impl<T> Storage for T where
    T: RoomRepository + PlayerRepository + ChapterRepository + VoteRepository + ResultRepository
{
}
