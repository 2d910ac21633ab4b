//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use crate::models::{Player, Room, RoomStatus, ScoreCredit, ALLOWED_CAPACITIES};

/// Validate that a room's state is internally consistent
pub fn assert_room_invariants(room: &Room) {
    debug_assert!(
        ALLOWED_CAPACITIES.contains(&room.capacity),
        "Room {} has capacity {} outside the allowed set",
        room.id,
        room.capacity
    );

    // Chapter order only exists while chapters are being played
    debug_assert!(
        (room.status == RoomStatus::Playing) == room.current_chapter_order.is_some(),
        "Room {} is {} with chapter order {:?}",
        room.id,
        room.status,
        room.current_chapter_order
    );

    debug_assert!(
        room.status.is_terminal() == room.resolved_at.is_some(),
        "Room {} is {} but resolved_at is {:?}",
        room.id,
        room.status,
        room.resolved_at
    );

    debug_assert!(
        room.status == RoomStatus::Waiting || room.started_at.is_some(),
        "Room {} left WAITING without a start time",
        room.id
    );
}

/// Validate that a phase change about to be committed is a legal step
pub fn assert_phase_transition(room: &Room, to: RoomStatus) {
    debug_assert!(
        room.status.can_advance_to(to),
        "Room {} cannot move from {} to {}",
        room.id,
        room.status,
        to
    );
}

/// Validate that a player list fits its room
pub fn assert_player_list_invariants(players: &[Player], room: &Room) {
    debug_assert!(
        players.len() <= room.capacity as usize,
        "Room {} seats {} players over capacity {}",
        room.id,
        players.len(),
        room.capacity
    );

    debug_assert!(
        players.iter().any(|p| p.user_id == room.host_user_id),
        "Room {} host is not seated",
        room.id
    );

    debug_assert!(
        players.iter().all(|p| p.score.units() >= 0),
        "Room {} has a negative score",
        room.id
    );
}

/// Validate a score credit before it is applied
pub fn assert_credit_invariants(credit: &ScoreCredit) {
    debug_assert!(
        credit.amount.units() >= 0,
        "Negative score credit {}",
        credit.amount
    );

    let mut seen = credit.user_ids.clone();
    seen.sort();
    seen.dedup();
    debug_assert!(
        seen.len() == credit.user_ids.len(),
        "Score credit lists a player twice"
    );
}
