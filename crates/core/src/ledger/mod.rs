//! Score ledger
//!
//! Each player's accumulated influence within a room. Scores only grow, and
//! a credit to several players lands as one batch or not at all.

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::invariants::assert_credit_invariants;
use crate::models::{Influence, Player, ScoreCredit};
use crate::storage::Storage;

pub struct ScoreLedger<'a, S> {
    store: &'a S,
}

impl<'a, S: Storage> ScoreLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Build a validated batch credit without applying it.
    ///
    /// Used when the credit must commit together with another guarded write.
    pub fn credit(&self, user_ids: &[Uuid], amount: Influence) -> Result<ScoreCredit> {
        if amount < Influence::ZERO {
            return Err(Error::Validation(format!(
                "Score credit must not be negative, got {amount}"
            )));
        }

        let mut recipients = Vec::with_capacity(user_ids.len());
        for id in user_ids {
            if !recipients.contains(id) {
                recipients.push(*id);
            }
        }

        let credit = ScoreCredit::new(recipients, amount);
        assert_credit_invariants(&credit);
        Ok(credit)
    }

    /// Add `amount` to every listed player, all or nothing
    #[instrument(skip(self, user_ids), fields(recipients = user_ids.len(), amount = %amount))]
    pub fn increment(&self, room_id: Uuid, user_ids: &[Uuid], amount: Influence) -> Result<()> {
        let credit = self.credit(user_ids, amount)?;
        if credit.is_empty() {
            return Ok(());
        }

        self.store.increment_scores(room_id, &credit)?;
        debug!("Scores credited");
        Ok(())
    }

    /// Current score of one player
    pub fn read(&self, room_id: Uuid, user_id: Uuid) -> Result<Influence> {
        self.store
            .find_player(room_id, user_id)?
            .map(|p| p.score)
            .ok_or_else(|| Error::NotFound("Player not found".into()))
    }

    /// All players in join order
    pub fn read_all(&self, room_id: Uuid) -> Result<Vec<Player>> {
        self.store.list_players(room_id)
    }

    /// Players sorted by score, highest first; equal scores keep join order
    pub fn standings(&self, room_id: Uuid) -> Result<Vec<Player>> {
        let mut players = self.read_all(room_id)?;
        players.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(players)
    }
}

/// Highest scorer; on equal scores the earliest joiner wins
pub fn most_valuable(players: &[Player]) -> Option<&Player> {
    players.iter().fold(None, |best: Option<&Player>, p| match best {
        Some(b) if b.score >= p.score => Some(b),
        _ => Some(p),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Room;
    use crate::storage::{Database, PlayerRepository, RoomRepository};

    fn room_with_players(db: &Database, n: usize) -> (Room, Vec<Uuid>) {
        let host = Uuid::new_v4();
        let room = Room::new(host, 9);
        db.create_room(&room, &Player::new(room.id, host, "host".into()))
            .unwrap();
        let mut ids = vec![host];
        for i in 1..n {
            let id = Uuid::new_v4();
            db.add_player(&Player::new(room.id, id, format!("p{i}")))
                .unwrap();
            ids.push(id);
        }
        (room, ids)
    }

    #[test]
    fn test_increment_batch() {
        let db = Database::open_in_memory().unwrap();
        let (room, ids) = room_with_players(&db, 3);
        let ledger = ScoreLedger::new(&db);

        ledger.increment(room.id, &ids[..2], Influence(100)).unwrap();

        assert_eq!(ledger.read(room.id, ids[0]).unwrap(), Influence(100));
        assert_eq!(ledger.read(room.id, ids[1]).unwrap(), Influence(100));
        assert_eq!(ledger.read(room.id, ids[2]).unwrap(), Influence::ZERO);
    }

    #[test]
    fn test_duplicate_recipients_credited_once() {
        let db = Database::open_in_memory().unwrap();
        let (room, ids) = room_with_players(&db, 1);
        let ledger = ScoreLedger::new(&db);

        ledger
            .increment(room.id, &[ids[0], ids[0]], Influence(100))
            .unwrap();

        assert_eq!(ledger.read(room.id, ids[0]).unwrap(), Influence(100));
    }

    #[test]
    fn test_negative_credit_rejected() {
        let db = Database::open_in_memory().unwrap();
        let (room, ids) = room_with_players(&db, 1);
        let ledger = ScoreLedger::new(&db);

        let err = ledger.increment(room.id, &ids, Influence(-100)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_read_unknown_player() {
        let db = Database::open_in_memory().unwrap();
        let (room, _) = room_with_players(&db, 1);

        let err = ScoreLedger::new(&db).read(room.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_standings_sorted_and_stable() {
        let db = Database::open_in_memory().unwrap();
        let (room, ids) = room_with_players(&db, 3);
        let ledger = ScoreLedger::new(&db);
        ledger.increment(room.id, &[ids[2]], Influence(200)).unwrap();

        let standings = ledger.standings(room.id).unwrap();
        let order: Vec<Uuid> = standings.iter().map(|p| p.user_id).collect();
        assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
    }

    #[test]
    fn test_most_valuable_prefers_first_seen() {
        let db = Database::open_in_memory().unwrap();
        let (room, ids) = room_with_players(&db, 3);
        let ledger = ScoreLedger::new(&db);
        ledger.increment(room.id, &ids[1..], Influence(100)).unwrap();

        let players = ledger.read_all(room.id).unwrap();
        assert_eq!(most_valuable(&players).unwrap().user_id, ids[1]);
        assert!(most_valuable(&[]).is_none());
    }
}
