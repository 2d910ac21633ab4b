//! Permission system for room operations

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Room;
use crate::storage::Storage;

/// Actions that can be performed in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAction {
    // Reads
    ViewRoom,
    ViewResults,

    // Participation
    CastVote,

    // Host controls
    StartGame,
    ResolveChapter,
    ResolveFinal,
}

impl RoomAction {
    fn describe(&self) -> &'static str {
        match self {
            RoomAction::ViewRoom | RoomAction::ViewResults => "Access denied",
            RoomAction::CastVote => "Not a room player",
            RoomAction::StartGame => "Only host can start",
            RoomAction::ResolveChapter | RoomAction::ResolveFinal => "Only host can resolve",
        }
    }
}

/// How the caller relates to a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Seat {
    Outsider,
    Player,
    Host,
}

/// Permission matrix for room seats
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Check if a seat may perform an action
    pub fn can_perform(seat: Seat, action: RoomAction) -> bool {
        match action {
            // Any seated player, host included
            RoomAction::ViewRoom | RoomAction::ViewResults | RoomAction::CastVote => {
                seat >= Seat::Player
            }

            // Host only
            RoomAction::StartGame | RoomAction::ResolveChapter | RoomAction::ResolveFinal => {
                seat == Seat::Host
            }
        }
    }
}

/// Load a room and the caller's seat in it
pub fn seat_of<S: Storage>(store: &S, room_id: Uuid, user_id: Uuid) -> Result<(Room, Seat)> {
    let room = store
        .find_room(room_id)?
        .ok_or_else(|| Error::NotFound("Room not found".into()))?;

    if room.is_host(user_id) {
        return Ok((room, Seat::Host));
    }

    let seat = match store.find_player(room_id, user_id)? {
        Some(_) => Seat::Player,
        None => Seat::Outsider,
    };
    Ok((room, seat))
}

/// Load a room and fail with `Forbidden` unless the caller may act on it
pub fn authorize<S: Storage>(
    store: &S,
    room_id: Uuid,
    user_id: Uuid,
    action: RoomAction,
) -> Result<(Room, Seat)> {
    let (room, seat) = seat_of(store, room_id, user_id)?;
    if !PermissionMatrix::can_perform(seat, action) {
        return Err(Error::Forbidden(action.describe().into()));
    }
    Ok((room, seat))
}
