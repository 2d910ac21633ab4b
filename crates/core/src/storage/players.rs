//! Player storage operations

use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{influence_from_sql, parse_datetime, parse_uuid, OptionalExt};
use crate::error::{Result, StoreError};
use crate::models::{Player, ScoreCredit};

const PLAYER_COLUMNS: &str = "room_id, user_id, nickname, score, joined_at";

pub(super) fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        room_id: parse_uuid(&row.get::<_, String>(0)?)?,
        user_id: parse_uuid(&row.get::<_, String>(1)?)?,
        nickname: row.get(2)?,
        score: influence_from_sql(row.get(3)?),
        joined_at: parse_datetime(&row.get::<_, String>(4)?)?,
    })
}

/// Insert a player unconditionally (host seat on room creation)
pub(super) fn insert_player(conn: &Connection, player: &Player) -> Result<()> {
    conn.execute(
        "INSERT INTO players (room_id, user_id, nickname, score, joined_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            player.room_id.to_string(),
            player.user_id.to_string(),
            player.nickname,
            player.score.units(),
            player.joined_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Apply a score credit inside an open transaction.
///
/// Fails with `StoreError::NotFound` if any recipient has no seat, which
/// rolls back the caller's whole batch.
pub(super) fn apply_credit(conn: &Connection, room_id: Uuid, credit: &ScoreCredit) -> Result<()> {
    debug_assert!(credit.amount.units() >= 0, "score credit must not be negative");

    let mut stmt = conn.prepare(
        "UPDATE players SET score = score + ?1 WHERE room_id = ?2 AND user_id = ?3",
    )?;
    for user_id in &credit.user_ids {
        let changed = stmt.execute(params![
            credit.amount.units(),
            room_id.to_string(),
            user_id.to_string()
        ])?;
        if changed == 0 {
            return Err(StoreError::NotFound.into());
        }
    }
    Ok(())
}

pub struct PlayerStore<'a> {
    conn: &'a Connection,
}

impl<'a> PlayerStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Seat a player while the room is waiting and below capacity.
    ///
    /// The capacity check and insert are one statement, and the room version
    /// is bumped in the same transaction so a concurrent start sees the change.
    #[instrument(skip(self, player), fields(room_id = %player.room_id, user_id = %player.user_id))]
    pub fn add(&self, player: &Player) -> Result<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT INTO players (room_id, user_id, nickname, score, joined_at)
             SELECT ?1, ?2, ?3, ?4, ?5
             WHERE EXISTS (
                 SELECT 1 FROM rooms r
                 WHERE r.id = ?1
                   AND r.status = 'WAITING'
                   AND (SELECT COUNT(*) FROM players p WHERE p.room_id = r.id) < r.capacity
             )",
            params![
                player.room_id.to_string(),
                player.user_id.to_string(),
                player.nickname,
                player.score.units(),
                player.joined_at.to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            return Ok(false);
        }

        tx.execute(
            "UPDATE rooms SET version = version + 1 WHERE id = ?1",
            params![player.room_id.to_string()],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Find player by room and user
    #[instrument(skip(self))]
    pub fn find(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Player>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE room_id = ?1 AND user_id = ?2"
        ))?;

        let player = stmt
            .query_row(
                params![room_id.to_string(), user_id.to_string()],
                player_from_row,
            )
            .optional()?;

        Ok(player)
    }

    /// List players in join order
    #[instrument(skip(self))]
    pub fn list(&self, room_id: Uuid) -> Result<Vec<Player>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE room_id = ?1 ORDER BY rowid"
        ))?;

        let players = stmt
            .query_map(params![room_id.to_string()], player_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(players)
    }

    /// Count seated players
    #[instrument(skip(self))]
    pub fn count(&self, room_id: Uuid) -> Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM players WHERE room_id = ?1",
            params![room_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Credit several players in one transaction
    #[instrument(skip(self, credit), fields(recipients = credit.user_ids.len(), amount = %credit.amount))]
    pub fn increment_scores(&self, room_id: Uuid, credit: &ScoreCredit) -> Result<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        apply_credit(&tx, room_id, credit)?;
        tx.commit()?;
        Ok(())
    }
}
