//! Room lifecycle: creation, membership and lobby listing

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{Conflict, Error, Result, StoreError};
use crate::invariants::{assert_player_list_invariants, assert_room_invariants};
use crate::models::{
    GameState, Player, PlayerInfo, Room, RoomFilter, RoomStatus, RoomSummary, ALLOWED_CAPACITIES,
};
use crate::notify::{emit, Notifier, RoomEvent};
use crate::permissions::{authorize, RoomAction};
use crate::storage::Storage;

const MAX_NICKNAME_LEN: usize = 32;

/// Trim and check a nickname
pub fn validate_nickname(nickname: &str) -> Result<String> {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("nickname is required".into()));
    }
    if trimmed.chars().count() > MAX_NICKNAME_LEN {
        return Err(Error::Validation(format!(
            "nickname must be at most {MAX_NICKNAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub struct RoomManager<'a, S> {
    store: &'a S,
    notifier: &'a dyn Notifier,
}

impl<'a, S: Storage> RoomManager<'a, S> {
    pub fn new(store: &'a S, notifier: &'a dyn Notifier) -> Self {
        Self { store, notifier }
    }

    /// Create a room in WAITING with the host already seated
    #[instrument(skip(self, nickname))]
    pub fn create_room(&self, host_user_id: Uuid, capacity: u32, nickname: &str) -> Result<Room> {
        if !ALLOWED_CAPACITIES.contains(&capacity) {
            return Err(Error::Validation(format!(
                "Invalid capacity {capacity}, expected one of {ALLOWED_CAPACITIES:?}"
            )));
        }
        let nickname = validate_nickname(nickname)?;

        let room = Room::new(host_user_id, capacity);
        let host = Player::new(room.id, host_user_id, nickname);
        self.store.create_room(&room, &host)?;

        info!(room_id = %room.id, "Room created");
        emit(self.notifier, RoomEvent::RoomListChanged);
        Ok(room)
    }

    /// Take a seat in a waiting room.
    ///
    /// The membership and capacity pre-checks only give friendlier errors;
    /// the guarded insert decides simultaneous joins.
    #[instrument(skip(self, nickname))]
    pub fn join_room(&self, room_id: Uuid, user_id: Uuid, nickname: &str) -> Result<Player> {
        let nickname = validate_nickname(nickname)?;

        let room = self
            .store
            .find_room(room_id)?
            .ok_or_else(|| Error::NotFound("Room not found".into()))?;
        if room.status != RoomStatus::Waiting {
            return Err(Conflict::RoomNotJoinable.into());
        }
        if self.store.find_player(room_id, user_id)?.is_some() {
            return Err(Conflict::AlreadyJoined.into());
        }
        if self.store.count_players(room_id)? >= room.capacity {
            return Err(Conflict::RoomFull.into());
        }

        let player = Player::new(room_id, user_id, nickname);
        match self.store.add_player(&player) {
            Ok(true) => {}
            Ok(false) => return Err(self.explain_rejected_join(room_id)?.into()),
            Err(Error::Store(StoreError::UniqueViolation(_))) => {
                return Err(Conflict::AlreadyJoined.into())
            }
            Err(Error::Store(StoreError::ForeignKeyViolation(_))) => {
                return Err(Error::NotFound("Room not found".into()))
            }
            Err(e) => return Err(e),
        }

        info!("Player joined");
        emit(self.notifier, RoomEvent::PlayersChanged { room_id });
        if self.store.count_players(room_id)? >= room.capacity {
            emit(self.notifier, RoomEvent::RoomListChanged);
        }
        Ok(player)
    }

    /// Work out why the guarded insert refused a seat
    fn explain_rejected_join(&self, room_id: Uuid) -> Result<Conflict> {
        let room = self
            .store
            .find_room(room_id)?
            .ok_or_else(|| Error::NotFound("Room not found".into()))?;

        warn!(%room_id, status = %room.status, "Join lost a race");
        Ok(if room.status == RoomStatus::Waiting {
            Conflict::RoomFull
        } else {
            Conflict::RoomNotJoinable
        })
    }

    /// Room details, for the host or a seated player
    #[instrument(skip(self))]
    pub fn get_room(&self, room_id: Uuid, caller: Uuid) -> Result<Room> {
        let (room, _) = authorize(self.store, room_id, caller, RoomAction::ViewRoom)?;
        assert_room_invariants(&room);
        Ok(room)
    }

    /// Seated players in join order, flagging the host
    #[instrument(skip(self))]
    pub fn get_players(&self, room_id: Uuid, caller: Uuid) -> Result<Vec<PlayerInfo>> {
        let (room, _) = authorize(self.store, room_id, caller, RoomAction::ViewRoom)?;
        let players = self.store.list_players(room_id)?;
        assert_player_list_invariants(&players, &room);

        Ok(players
            .into_iter()
            .map(|p| PlayerInfo {
                is_host: room.is_host(p.user_id),
                user_id: p.user_id,
                nickname: p.nickname,
                score: p.score,
            })
            .collect())
    }

    /// Phase and chapter position of a room
    #[instrument(skip(self))]
    pub fn get_game_state(&self, room_id: Uuid, caller: Uuid) -> Result<GameState> {
        let (room, _) = authorize(self.store, room_id, caller, RoomAction::ViewRoom)?;
        Ok(GameState::from(&room))
    }

    /// Lobby listing; resolved rooms never appear
    #[instrument(skip(self))]
    pub fn list_rooms(&self, filter: &RoomFilter) -> Result<Vec<RoomSummary>> {
        self.store.list_rooms(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{BroadcastNotifier, FailingNotifier, NoopNotifier};
    use crate::storage::Database;

    #[test]
    fn test_notifier_failure_does_not_fail_room_calls() {
        let db = Database::open_in_memory().unwrap();
        let rooms = RoomManager::new(&db, &FailingNotifier);
        let host = Uuid::new_v4();

        let room = rooms.create_room(host, 3, "host").unwrap();
        rooms.join_room(room.id, Uuid::new_v4(), "b").unwrap();

        assert_eq!(rooms.get_players(room.id, host).unwrap().len(), 2);
    }

    #[test]
    fn test_create_room_rejects_even_capacity() {
        let db = Database::open_in_memory().unwrap();
        let rooms = RoomManager::new(&db, &NoopNotifier);

        let err = rooms.create_room(Uuid::new_v4(), 4, "host").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(rooms.list_rooms(&RoomFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_create_room_requires_nickname() {
        let db = Database::open_in_memory().unwrap();
        let rooms = RoomManager::new(&db, &NoopNotifier);

        let err = rooms.create_room(Uuid::new_v4(), 3, "   ").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_join_until_full() {
        let db = Database::open_in_memory().unwrap();
        let rooms = RoomManager::new(&db, &NoopNotifier);
        let room = rooms.create_room(Uuid::new_v4(), 3, "host").unwrap();

        rooms.join_room(room.id, Uuid::new_v4(), "b").unwrap();
        rooms.join_room(room.id, Uuid::new_v4(), "c").unwrap();
        let err = rooms.join_room(room.id, Uuid::new_v4(), "d").unwrap_err();

        assert_eq!(err.conflict(), Some(&Conflict::RoomFull));
    }

    #[test]
    fn test_join_twice() {
        let db = Database::open_in_memory().unwrap();
        let rooms = RoomManager::new(&db, &NoopNotifier);
        let room = rooms.create_room(Uuid::new_v4(), 5, "host").unwrap();
        let user = Uuid::new_v4();

        rooms.join_room(room.id, user, "b").unwrap();
        let err = rooms.join_room(room.id, user, "b").unwrap_err();
        assert_eq!(err.conflict(), Some(&Conflict::AlreadyJoined));

        let err = rooms.join_room(room.id, room.host_user_id, "host").unwrap_err();
        assert_eq!(err.conflict(), Some(&Conflict::AlreadyJoined));
    }

    #[test]
    fn test_join_missing_room() {
        let db = Database::open_in_memory().unwrap();
        let rooms = RoomManager::new(&db, &NoopNotifier);

        let err = rooms.join_room(Uuid::new_v4(), Uuid::new_v4(), "b").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_reads_are_member_only() {
        let db = Database::open_in_memory().unwrap();
        let rooms = RoomManager::new(&db, &NoopNotifier);
        let room = rooms.create_room(Uuid::new_v4(), 3, "host").unwrap();
        let guest = Uuid::new_v4();
        rooms.join_room(room.id, guest, "guest").unwrap();

        assert!(matches!(
            rooms.get_room(room.id, Uuid::new_v4()),
            Err(Error::Forbidden(_))
        ));

        let players = rooms.get_players(room.id, guest).unwrap();
        assert_eq!(players.len(), 2);
        assert!(players[0].is_host);
        assert!(!players[1].is_host);
        assert_eq!(players[1].nickname, "guest");

        let state = rooms.get_game_state(room.id, guest).unwrap();
        assert_eq!(state.phase, RoomStatus::Waiting);
        assert_eq!(state.current_chapter_order, None);
    }

    #[test]
    fn test_mutations_notify() {
        let db = Database::open_in_memory().unwrap();
        let notifier = BroadcastNotifier::new(16);
        let mut rx = notifier.subscribe();
        let rooms = RoomManager::new(&db, &notifier);

        let room = rooms.create_room(Uuid::new_v4(), 3, "host").unwrap();
        rooms.join_room(room.id, Uuid::new_v4(), "b").unwrap();

        assert_eq!(rx.try_recv().unwrap(), RoomEvent::RoomListChanged);
        assert_eq!(
            rx.try_recv().unwrap(),
            RoomEvent::PlayersChanged { room_id: room.id }
        );
    }
}
