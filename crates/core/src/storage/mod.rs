//! SQLite storage layer for Survivote

mod chapters;
mod migrations;
mod parse;
mod players;
mod results;
mod rooms;
mod traits;
mod votes;

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Chapter, ChapterResolution, ChapterVote, LeaderVote, Player, Room, RoomFilter, RoomResult,
    RoomSummary, ScoreCredit,
};

pub use chapters::ChapterStore;
pub use players::PlayerStore;
pub use results::ResultStore;
pub use rooms::RoomStore;
pub use traits::{
    CasOutcome, ChapterCommit, ChapterRepository, PlayerRepository, ResultRepository,
    RoomRepository, Storage, VoteRepository,
};
pub use votes::VoteStore;

/// How long a writer waits on another handle's lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::configure(conn)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        migrations::run_migrations(&db.conn)?;
        Ok(db)
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    pub fn rooms(&self) -> RoomStore<'_> {
        RoomStore::new(&self.conn)
    }

    pub fn players(&self) -> PlayerStore<'_> {
        PlayerStore::new(&self.conn)
    }

    pub fn chapters(&self) -> ChapterStore<'_> {
        ChapterStore::new(&self.conn)
    }

    pub fn votes(&self) -> VoteStore<'_> {
        VoteStore::new(&self.conn)
    }

    pub fn results(&self) -> ResultStore<'_> {
        ResultStore::new(&self.conn)
    }
}

// Implement repository traits for Database
// This enables using Database through the trait interface

impl RoomRepository for Database {
    fn create_room(&self, room: &Room, host: &Player) -> Result<()> {
        self.rooms().create(room, host)
    }

    fn find_room(&self, id: Uuid) -> Result<Option<Room>> {
        self.rooms().find_by_id(id)
    }

    fn list_rooms(&self, filter: &RoomFilter) -> Result<Vec<RoomSummary>> {
        self.rooms().list(filter)
    }

    fn start_room(
        &self,
        room_id: Uuid,
        expected_version: u64,
        catalog: &[Chapter],
    ) -> Result<CasOutcome> {
        self.rooms().start(room_id, expected_version, catalog)
    }

    fn commit_chapter_resolution(&self, commit: &ChapterCommit) -> Result<CasOutcome> {
        self.rooms().commit_chapter_resolution(commit)
    }

    fn commit_final_resolution(
        &self,
        expected_version: u64,
        result: &RoomResult,
    ) -> Result<CasOutcome> {
        self.rooms().commit_final_resolution(expected_version, result)
    }
}

impl PlayerRepository for Database {
    fn add_player(&self, player: &Player) -> Result<bool> {
        self.players().add(player)
    }

    fn find_player(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Player>> {
        self.players().find(room_id, user_id)
    }

    fn list_players(&self, room_id: Uuid) -> Result<Vec<Player>> {
        self.players().list(room_id)
    }

    fn count_players(&self, room_id: Uuid) -> Result<u32> {
        self.players().count(room_id)
    }

    fn increment_scores(&self, room_id: Uuid, credit: &ScoreCredit) -> Result<()> {
        self.players().increment_scores(room_id, credit)
    }
}

impl ChapterRepository for Database {
    fn list_chapters(&self, room_id: Uuid) -> Result<Vec<Chapter>> {
        self.chapters().list_for_room(room_id)
    }

    fn find_chapter(&self, room_id: Uuid, chapter_id: Uuid) -> Result<Option<Chapter>> {
        self.chapters().find_by_id(room_id, chapter_id)
    }

    fn find_chapter_by_order(&self, room_id: Uuid, order: u32) -> Result<Option<Chapter>> {
        self.chapters().find_by_order(room_id, order)
    }

    fn list_resolutions(&self, room_id: Uuid) -> Result<Vec<ChapterResolution>> {
        self.chapters().list_resolutions(room_id)
    }
}

impl VoteRepository for Database {
    fn insert_chapter_vote(&self, vote: &ChapterVote) -> Result<bool> {
        self.votes().insert_chapter_vote(vote)
    }

    fn list_chapter_votes(&self, room_id: Uuid, chapter_id: Uuid) -> Result<Vec<ChapterVote>> {
        self.votes().list_chapter_votes(room_id, chapter_id)
    }

    fn count_chapter_votes(&self, room_id: Uuid, chapter_id: Uuid) -> Result<u32> {
        self.votes().count_chapter_votes(room_id, chapter_id)
    }

    fn insert_leader_vote(&self, vote: &LeaderVote) -> Result<bool> {
        self.votes().insert_leader_vote(vote)
    }

    fn list_leader_votes(&self, room_id: Uuid) -> Result<Vec<LeaderVote>> {
        self.votes().list_leader_votes(room_id)
    }

    fn count_leader_votes(&self, room_id: Uuid) -> Result<u32> {
        self.votes().count_leader_votes(room_id)
    }
}

impl ResultRepository for Database {
    fn find_result(&self, room_id: Uuid) -> Result<Option<RoomResult>> {
        self.results().find(room_id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use tempfile::tempdir;

    use super::*;
    use crate::error::{Error, StoreError};
    use crate::models::{Candidate, Choice, Influence, RoomStatus};

    fn seeded_room(db: &Database, capacity: u32) -> Room {
        let host = Uuid::new_v4();
        let room = Room::new(host, capacity);
        db.create_room(&room, &Player::new(room.id, host, "host".into()))
            .unwrap();
        room
    }

    fn catalog(room_id: Uuid, len: u32) -> Vec<Chapter> {
        (1..=len)
            .map(|order| Chapter {
                id: Uuid::new_v4(),
                room_id,
                order,
                title: format!("Chapter {order}"),
                description: String::new(),
                option_a_label: "A".into(),
                option_b_label: "B".into(),
            })
            .collect()
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        assert_eq!(db.schema_version(), 2);
    }

    #[test]
    fn test_create_room_seats_host() {
        let db = Database::open_in_memory().unwrap();
        let room = seeded_room(&db, 3);

        let stored = db.find_room(room.id).unwrap().unwrap();
        assert_eq!(stored.status, RoomStatus::Waiting);
        assert_eq!(stored.current_chapter_order, None);
        assert_eq!(db.count_players(room.id).unwrap(), 1);
        assert!(db.find_player(room.id, room.host_user_id).unwrap().is_some());
    }

    #[test]
    fn test_duplicate_seat_is_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        let room = seeded_room(&db, 3);

        let err = db
            .add_player(&Player::new(room.id, room.host_user_id, "again".into()))
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::UniqueViolation(_))));
    }

    #[test]
    fn test_add_player_respects_capacity() {
        let db = Database::open_in_memory().unwrap();
        let room = seeded_room(&db, 3);

        assert!(db.add_player(&Player::new(room.id, Uuid::new_v4(), "b".into())).unwrap());
        assert!(db.add_player(&Player::new(room.id, Uuid::new_v4(), "c".into())).unwrap());
        assert!(!db.add_player(&Player::new(room.id, Uuid::new_v4(), "d".into())).unwrap());
        assert_eq!(db.count_players(room.id).unwrap(), 3);
    }

    #[test]
    fn test_join_bumps_version() {
        let db = Database::open_in_memory().unwrap();
        let room = seeded_room(&db, 3);

        db.add_player(&Player::new(room.id, Uuid::new_v4(), "b".into()))
            .unwrap();
        let outcome = db.start_room(room.id, room.version, &catalog(room.id, 2)).unwrap();
        assert_eq!(outcome, CasOutcome::Stale);
    }

    #[test]
    fn test_start_seeds_catalog_once() {
        let db = Database::open_in_memory().unwrap();
        let room = seeded_room(&db, 3);

        let outcome = db.start_room(room.id, room.version, &catalog(room.id, 4)).unwrap();
        assert!(outcome.is_applied());

        let started = db.find_room(room.id).unwrap().unwrap();
        assert_eq!(started.status, RoomStatus::Playing);
        assert_eq!(started.current_chapter_order, Some(1));
        assert!(started.started_at.is_some());
        assert_eq!(db.list_chapters(room.id).unwrap().len(), 4);

        // Second start is stale and seeds nothing
        let again = db.start_room(room.id, room.version, &catalog(room.id, 4)).unwrap();
        assert_eq!(again, CasOutcome::Stale);
        assert_eq!(db.list_chapters(room.id).unwrap().len(), 4);
    }

    #[test]
    fn test_stale_chapter_commit_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let room = seeded_room(&db, 3);
        db.start_room(room.id, room.version, &catalog(room.id, 2)).unwrap();
        let playing = db.find_room(room.id).unwrap().unwrap();
        let chapter = db.find_chapter_by_order(room.id, 1).unwrap().unwrap();

        let commit = ChapterCommit {
            room_id: room.id,
            expected_version: playing.version,
            expected_order: 1,
            next_order: Some(2),
            resolution: ChapterResolution {
                id: Uuid::new_v4(),
                room_id: room.id,
                chapter_id: chapter.id,
                majority: Choice::A,
                count_a: 1,
                count_b: 0,
                resolved_at: Utc::now(),
            },
            credit: ScoreCredit::new(vec![room.host_user_id], Influence(100)),
        };

        assert!(db.commit_chapter_resolution(&commit).unwrap().is_applied());
        assert_eq!(db.commit_chapter_resolution(&commit).unwrap(), CasOutcome::Stale);

        let host = db.find_player(room.id, room.host_user_id).unwrap().unwrap();
        assert_eq!(host.score, Influence(100));
        assert_eq!(db.list_resolutions(room.id).unwrap().len(), 1);
    }

    #[test]
    fn test_credit_to_unknown_player_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let room = seeded_room(&db, 3);

        let credit = ScoreCredit::new(vec![room.host_user_id, Uuid::new_v4()], Influence(100));
        let err = db.increment_scores(room.id, &credit).unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::NotFound)));

        let host = db.find_player(room.id, room.host_user_id).unwrap().unwrap();
        assert_eq!(host.score, Influence::ZERO);
    }

    #[test]
    fn test_final_result_written_once() {
        let db = Database::open_in_memory().unwrap();
        let room = seeded_room(&db, 3);
        db.start_room(room.id, room.version, &catalog(room.id, 1)).unwrap();
        let playing = db.find_room(room.id).unwrap().unwrap();
        let chapter = db.find_chapter_by_order(room.id, 1).unwrap().unwrap();
        db.commit_chapter_resolution(&ChapterCommit {
            room_id: room.id,
            expected_version: playing.version,
            expected_order: 1,
            next_order: None,
            resolution: ChapterResolution {
                id: Uuid::new_v4(),
                room_id: room.id,
                chapter_id: chapter.id,
                majority: Choice::B,
                count_a: 0,
                count_b: 1,
                resolved_at: Utc::now(),
            },
            credit: ScoreCredit::new(vec![], Influence(100)),
        })
        .unwrap();
        let final_vote = db.find_room(room.id).unwrap().unwrap();
        assert_eq!(final_vote.status, RoomStatus::FinalVote);
        assert_eq!(final_vote.current_chapter_order, None);

        let mut totals = BTreeMap::new();
        totals.insert(Candidate::Choice(Choice::A).encode(), Influence(500));
        let result = RoomResult {
            room_id: room.id,
            winner: Candidate::Choice(Choice::A),
            winning_weight: Influence(500),
            totals,
            mvp_user_id: Some(room.host_user_id),
            resolved_at: Utc::now(),
        };

        assert!(db.commit_final_resolution(final_vote.version, &result).unwrap().is_applied());
        assert_eq!(
            db.commit_final_resolution(final_vote.version, &result).unwrap(),
            CasOutcome::Stale
        );

        let stored = db.find_result(room.id).unwrap().unwrap();
        assert_eq!(stored, result_with_rfc3339_precision(result));
        assert_eq!(
            db.find_room(room.id).unwrap().unwrap().status,
            RoomStatus::Resolved
        );
    }

    #[test]
    fn test_chapter_vote_needs_active_chapter() {
        let db = Database::open_in_memory().unwrap();
        let room = seeded_room(&db, 3);
        db.start_room(room.id, room.version, &catalog(room.id, 2)).unwrap();
        let playing = db.find_room(room.id).unwrap().unwrap();
        let second = db.find_chapter_by_order(room.id, 2).unwrap().unwrap();

        let early = ChapterVote::new(room.id, second.id, room.host_user_id, Choice::A);
        assert!(!db.insert_chapter_vote(&early).unwrap());
        assert_eq!(db.count_chapter_votes(room.id, second.id).unwrap(), 0);
        assert_eq!(db.find_room(room.id).unwrap().unwrap().version, playing.version);

        let first = db.find_chapter_by_order(room.id, 1).unwrap().unwrap();
        let vote = ChapterVote::new(room.id, first.id, room.host_user_id, Choice::A);
        assert!(db.insert_chapter_vote(&vote).unwrap());
        assert_eq!(db.find_room(room.id).unwrap().unwrap().version, playing.version + 1);
    }

    #[test]
    fn test_vote_after_tally_makes_commit_stale() {
        let db = Database::open_in_memory().unwrap();
        let room = seeded_room(&db, 3);
        let guest = Uuid::new_v4();
        db.add_player(&Player::new(room.id, guest, "b".into())).unwrap();
        let waiting = db.find_room(room.id).unwrap().unwrap();
        db.start_room(room.id, waiting.version, &catalog(room.id, 1)).unwrap();
        let chapter = db.find_chapter_by_order(room.id, 1).unwrap().unwrap();

        db.insert_chapter_vote(&ChapterVote::new(room.id, chapter.id, room.host_user_id, Choice::A))
            .unwrap();
        let tallied = db.find_room(room.id).unwrap().unwrap();
        db.insert_chapter_vote(&ChapterVote::new(room.id, chapter.id, guest, Choice::B))
            .unwrap();

        let commit = ChapterCommit {
            room_id: room.id,
            expected_version: tallied.version,
            expected_order: 1,
            next_order: None,
            resolution: ChapterResolution {
                id: Uuid::new_v4(),
                room_id: room.id,
                chapter_id: chapter.id,
                majority: Choice::A,
                count_a: 1,
                count_b: 0,
                resolved_at: Utc::now(),
            },
            credit: ScoreCredit::new(vec![room.host_user_id], Influence(100)),
        };
        assert_eq!(db.commit_chapter_resolution(&commit).unwrap(), CasOutcome::Stale);
        assert!(db.list_resolutions(room.id).unwrap().is_empty());
    }

    #[test]
    fn test_leader_vote_needs_final_vote() {
        let db = Database::open_in_memory().unwrap();
        let room = seeded_room(&db, 3);
        let ballot = LeaderVote::new(
            room.id,
            room.host_user_id,
            Candidate::Player(room.host_user_id),
            Influence::ZERO,
        );

        assert!(!db.insert_leader_vote(&ballot).unwrap());
        assert_eq!(db.count_leader_votes(room.id).unwrap(), 0);
        assert_eq!(db.find_room(room.id).unwrap().unwrap().version, room.version);
    }

    fn result_with_rfc3339_precision(mut result: RoomResult) -> RoomResult {
        result.resolved_at = crate::storage::parse::parse_datetime(&result.resolved_at.to_rfc3339())
            .unwrap();
        result
    }

    #[test]
    fn test_list_rooms_filters() {
        let db = Database::open_in_memory().unwrap();
        let small = seeded_room(&db, 3);
        let big = seeded_room(&db, 5);
        db.add_player(&Player::new(big.id, Uuid::new_v4(), "b".into()))
            .unwrap();
        db.start_room(small.id, small.version, &catalog(small.id, 1))
            .unwrap();

        let all = db.list_rooms(&RoomFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let joinable = db
            .list_rooms(&RoomFilter {
                only_joinable: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(joinable.len(), 1);
        assert_eq!(joinable[0].id, big.id);
        assert_eq!(joinable[0].current_players, 2);

        let crowded = db
            .list_rooms(&RoomFilter {
                min_players: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(crowded.len(), 1);

        let playing = db
            .list_rooms(&RoomFilter {
                status: Some(RoomStatus::Playing),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(playing.len(), 1);
        assert_eq!(playing[0].id, small.id);
    }
}
