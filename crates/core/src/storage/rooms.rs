//! Room storage operations
//!
//! Every phase change goes through a versioned compare-and-swap: the
//! `UPDATE` matches on the version read by the caller, and a zero-row result
//! rolls back everything written in the same transaction.

use chrono::Utc;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::parse::{
    order_from_sql, parse_datetime, parse_datetime_opt, parse_status, parse_uuid, OptionalExt,
};
use super::players::{apply_credit, insert_player};
use super::traits::{CasOutcome, ChapterCommit};
use crate::error::Result;
use crate::models::{Chapter, Player, Room, RoomFilter, RoomResult, RoomStatus, RoomSummary};

const ROOM_COLUMNS: &str = "id, host_user_id, capacity, status, current_chapter_order, \
                            created_at, started_at, resolved_at, version";

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<Room> {
    Ok(Room {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        host_user_id: parse_uuid(&row.get::<_, String>(1)?)?,
        capacity: row.get(2)?,
        status: parse_status(&row.get::<_, String>(3)?)?,
        current_chapter_order: order_from_sql(row.get(4)?),
        created_at: parse_datetime(&row.get::<_, String>(5)?)?,
        started_at: parse_datetime_opt(row.get(6)?)?,
        resolved_at: parse_datetime_opt(row.get(7)?)?,
        version: row.get(8)?,
    })
}

pub struct RoomStore<'a> {
    conn: &'a Connection,
}

impl<'a> RoomStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a room and seat its host atomically
    #[instrument(skip(self, room, host), fields(room_id = %room.id, capacity = room.capacity))]
    pub fn create(&self, room: &Room, host: &Player) -> Result<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO rooms (id, host_user_id, capacity, status, current_chapter_order, created_at, started_at, resolved_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                room.id.to_string(),
                room.host_user_id.to_string(),
                room.capacity,
                room.status.as_str(),
                room.current_chapter_order,
                room.created_at.to_rfc3339(),
                room.started_at.map(|t| t.to_rfc3339()),
                room.resolved_at.map(|t| t.to_rfc3339()),
                room.version,
            ],
        )?;
        insert_player(&tx, host)?;

        tx.commit()?;
        Ok(())
    }

    /// Find room by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Room>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1"))?;

        let room = stmt
            .query_row(params![id.to_string()], room_from_row)
            .optional()?;

        Ok(room)
    }

    /// List unresolved rooms, newest first
    #[instrument(skip(self))]
    pub fn list(&self, filter: &RoomFilter) -> Result<Vec<RoomSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.status, r.capacity, r.created_at,
                    (SELECT COUNT(*) FROM players p WHERE p.room_id = r.id) AS player_count
             FROM rooms r
             WHERE r.status != 'RESOLVED'
               AND (?1 IS NULL OR r.status = ?1)
             ORDER BY r.rowid DESC",
        )?;

        let rooms = stmt
            .query_map(params![filter.status.map(|s| s.as_str())], |row| {
                Ok(RoomSummary {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    status: parse_status(&row.get::<_, String>(1)?)?,
                    capacity: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?)?,
                    current_players: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rooms
            .into_iter()
            .filter(|r| filter.min_players.map_or(true, |min| r.current_players >= min))
            .filter(|r| {
                !filter.only_joinable
                    || (r.status == RoomStatus::Waiting && r.current_players < r.capacity)
            })
            .collect())
    }

    /// Seed the catalog once, then move WAITING -> PLAYING(1)
    #[instrument(skip(self, catalog), fields(chapters = catalog.len()))]
    pub fn start(&self, room_id: Uuid, expected_version: u64, catalog: &[Chapter]) -> Result<CasOutcome> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE rooms
             SET status = 'PLAYING', current_chapter_order = 1, started_at = ?1, version = version + 1
             WHERE id = ?2 AND version = ?3 AND status = 'WAITING'",
            params![Utc::now().to_rfc3339(), room_id.to_string(), expected_version],
        )?;
        if changed == 0 {
            debug!("Start lost compare-and-swap");
            return Ok(CasOutcome::Stale);
        }

        let seeded: u32 = tx.query_row(
            "SELECT COUNT(*) FROM chapters WHERE room_id = ?1",
            params![room_id.to_string()],
            |row| row.get(0),
        )?;
        if seeded == 0 {
            let mut insert = tx.prepare(
                "INSERT INTO chapters (id, room_id, chapter_order, title, description, option_a_label, option_b_label)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for chapter in catalog {
                insert.execute(params![
                    chapter.id.to_string(),
                    room_id.to_string(),
                    chapter.order,
                    chapter.title,
                    chapter.description,
                    chapter.option_a_label,
                    chapter.option_b_label,
                ])?;
            }
        }

        tx.commit()?;
        Ok(CasOutcome::Applied)
    }

    /// Record the outcome, credit the majority and advance, all under one guard
    #[instrument(skip(self, commit), fields(room_id = %commit.room_id, order = commit.expected_order))]
    pub fn commit_chapter_resolution(&self, commit: &ChapterCommit) -> Result<CasOutcome> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let next_status = match commit.next_order {
            Some(_) => RoomStatus::Playing,
            None => RoomStatus::FinalVote,
        };
        let changed = tx.execute(
            "UPDATE rooms
             SET status = ?1, current_chapter_order = ?2, version = version + 1
             WHERE id = ?3 AND version = ?4 AND status = 'PLAYING' AND current_chapter_order = ?5",
            params![
                next_status.as_str(),
                commit.next_order,
                commit.room_id.to_string(),
                commit.expected_version,
                commit.expected_order,
            ],
        )?;
        if changed == 0 {
            debug!("Chapter resolution lost compare-and-swap");
            return Ok(CasOutcome::Stale);
        }

        let resolution = &commit.resolution;
        tx.execute(
            "INSERT INTO chapter_resolutions (id, room_id, chapter_id, majority, count_a, count_b, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                resolution.id.to_string(),
                resolution.room_id.to_string(),
                resolution.chapter_id.to_string(),
                resolution.majority.as_str(),
                resolution.count_a,
                resolution.count_b,
                resolution.resolved_at.to_rfc3339(),
            ],
        )?;
        apply_credit(&tx, commit.room_id, &commit.credit)?;

        tx.commit()?;
        Ok(CasOutcome::Applied)
    }

    /// Write the single result row and close the room
    #[instrument(skip(self, result), fields(room_id = %result.room_id))]
    pub fn commit_final_resolution(&self, expected_version: u64, result: &RoomResult) -> Result<CasOutcome> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE rooms
             SET status = 'RESOLVED', current_chapter_order = NULL, resolved_at = ?1, version = version + 1
             WHERE id = ?2 AND version = ?3 AND status = 'FINAL_VOTE'",
            params![
                result.resolved_at.to_rfc3339(),
                result.room_id.to_string(),
                expected_version,
            ],
        )?;
        if changed == 0 {
            debug!("Final resolution lost compare-and-swap");
            return Ok(CasOutcome::Stale);
        }

        tx.execute(
            "INSERT INTO room_results (room_id, winner, winning_weight, totals_json, mvp_user_id, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                result.room_id.to_string(),
                result.winner.encode(),
                result.winning_weight.units(),
                serde_json::to_string(&result.totals)?,
                result.mvp_user_id.map(|id| id.to_string()),
                result.resolved_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(CasOutcome::Applied)
    }
}
