//! Vote storage operations
//!
//! Uniqueness of (room, chapter, user) and (room, voter) is enforced by the
//! schema; a losing concurrent insert surfaces as a unique violation.
//!
//! Inserts are guarded on the room phase and bump the room version, so a
//! ballot never lands on a closed round and a tally taken before it loses
//! its compare-and-swap.

use chrono::Utc;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{influence_from_sql, parse_candidate, parse_choice, parse_uuid};
use crate::error::Result;
use crate::models::{ChapterVote, LeaderVote};

/// Commit a guarded insert, bumping the room version; `false` when the guard held it back
fn bump_and_commit(tx: Transaction<'_>, inserted: usize, room_id: Uuid) -> Result<bool> {
    if inserted == 0 {
        return Ok(false);
    }

    tx.execute(
        "UPDATE rooms SET version = version + 1 WHERE id = ?1",
        params![room_id.to_string()],
    )?;
    tx.commit()?;
    Ok(true)
}

pub struct VoteStore<'a> {
    conn: &'a Connection,
}

impl<'a> VoteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    #[instrument(skip(self, vote), fields(room_id = %vote.room_id, chapter_id = %vote.chapter_id, user_id = %vote.user_id))]
    pub fn insert_chapter_vote(&self, vote: &ChapterVote) -> Result<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT INTO chapter_votes (id, room_id, chapter_id, user_id, choice, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6
             WHERE EXISTS (
                 SELECT 1 FROM rooms r
                 JOIN chapters c ON c.room_id = r.id
                 WHERE r.id = ?2
                   AND c.id = ?3
                   AND r.status = 'PLAYING'
                   AND r.current_chapter_order = c.chapter_order
             )",
            params![
                vote.id.to_string(),
                vote.room_id.to_string(),
                vote.chapter_id.to_string(),
                vote.user_id.to_string(),
                vote.choice.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        bump_and_commit(tx, inserted, vote.room_id)
    }

    #[instrument(skip(self))]
    pub fn list_chapter_votes(&self, room_id: Uuid, chapter_id: Uuid) -> Result<Vec<ChapterVote>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, chapter_id, user_id, choice FROM chapter_votes
             WHERE room_id = ?1 AND chapter_id = ?2
             ORDER BY rowid",
        )?;

        let votes = stmt
            .query_map(params![room_id.to_string(), chapter_id.to_string()], |row| {
                Ok(ChapterVote {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    room_id: parse_uuid(&row.get::<_, String>(1)?)?,
                    chapter_id: parse_uuid(&row.get::<_, String>(2)?)?,
                    user_id: parse_uuid(&row.get::<_, String>(3)?)?,
                    choice: parse_choice(&row.get::<_, String>(4)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(votes)
    }

    #[instrument(skip(self))]
    pub fn count_chapter_votes(&self, room_id: Uuid, chapter_id: Uuid) -> Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM chapter_votes WHERE room_id = ?1 AND chapter_id = ?2",
            params![room_id.to_string(), chapter_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    #[instrument(skip(self, vote), fields(room_id = %vote.room_id, voter = %vote.voter_user_id, weight = %vote.weight))]
    pub fn insert_leader_vote(&self, vote: &LeaderVote) -> Result<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT INTO leader_votes (id, room_id, voter_user_id, candidate, weight, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6
             WHERE EXISTS (
                 SELECT 1 FROM rooms WHERE id = ?2 AND status = 'FINAL_VOTE'
             )",
            params![
                vote.id.to_string(),
                vote.room_id.to_string(),
                vote.voter_user_id.to_string(),
                vote.candidate.encode(),
                vote.weight.units(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        bump_and_commit(tx, inserted, vote.room_id)
    }

    #[instrument(skip(self))]
    pub fn list_leader_votes(&self, room_id: Uuid) -> Result<Vec<LeaderVote>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, voter_user_id, candidate, weight FROM leader_votes
             WHERE room_id = ?1
             ORDER BY rowid",
        )?;

        let votes = stmt
            .query_map(params![room_id.to_string()], |row| {
                Ok(LeaderVote {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    room_id: parse_uuid(&row.get::<_, String>(1)?)?,
                    voter_user_id: parse_uuid(&row.get::<_, String>(2)?)?,
                    candidate: parse_candidate(&row.get::<_, String>(3)?)?,
                    weight: influence_from_sql(row.get(4)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(votes)
    }

    #[instrument(skip(self))]
    pub fn count_leader_votes(&self, room_id: Uuid) -> Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM leader_votes WHERE room_id = ?1",
            params![room_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
