//! Leader election
//!
//! The closing vote of a room. Each ballot carries the voter's score at the
//! moment it was cast; the candidate with the highest weighted sum wins and
//! the room is closed with a single `RoomResult`. Ballots are only stored
//! during FINAL_VOTE and bump the room version, so a tally that missed one
//! is taken again before the room closes.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::BallotKind;
use crate::error::{Conflict, Error, Result, StoreError};
use crate::invariants::{assert_phase_transition, assert_room_invariants};
use crate::ledger::{most_valuable, ScoreLedger};
use crate::models::{Candidate, Influence, LeaderVote, PlayerInfo, Room, RoomResult, RoomStatus};
use crate::notify::{emit, Notifier, RoomEvent};
use crate::permissions::{authorize, RoomAction};
use crate::storage::{CasOutcome, Storage};

/// How many times the final tally is taken again after losing its swap to a new ballot
const MAX_RETALLIES: usize = 8;

/// Weighted sums per candidate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeightedTally {
    totals: BTreeMap<Candidate, Influence>,
}

impl WeightedTally {
    pub fn of(votes: &[LeaderVote]) -> Self {
        let mut totals = BTreeMap::new();
        for vote in votes {
            let sum = totals.entry(vote.candidate).or_insert(Influence::ZERO);
            *sum = *sum + vote.weight;
        }
        Self { totals }
    }

    pub fn total_for(&self, candidate: &Candidate) -> Influence {
        self.totals.get(candidate).copied().unwrap_or(Influence::ZERO)
    }

    /// Highest sum, or `None` when empty or when two candidates share it
    pub fn winner(&self) -> Option<(Candidate, Influence)> {
        let top = self.totals.values().copied().max()?;
        let mut leaders = self.totals.iter().filter(|(_, w)| **w == top);
        let (candidate, weight) = leaders.next()?;
        if leaders.next().is_some() {
            return None;
        }
        Some((*candidate, *weight))
    }

    /// Totals keyed by the candidate's column encoding
    pub fn encoded(&self) -> BTreeMap<String, Influence> {
        self.totals
            .iter()
            .map(|(c, w)| (c.encode(), *w))
            .collect()
    }
}

/// Returned from a leader vote
#[derive(Debug, Clone)]
pub struct LeaderVoteReceipt {
    pub vote: LeaderVote,
    pub phase: RoomStatus,
    /// Present when this ballot completed the quorum and closed the room
    pub result: Option<RoomResult>,
}

pub struct LeaderElection<'a, S> {
    store: &'a S,
    notifier: &'a dyn Notifier,
    ballot: BallotKind,
}

impl<'a, S: Storage> LeaderElection<'a, S> {
    pub fn new(store: &'a S, notifier: &'a dyn Notifier, ballot: BallotKind) -> Self {
        Self {
            store,
            notifier,
            ballot,
        }
    }

    fn load_room(&self, room_id: Uuid) -> Result<Room> {
        self.store
            .find_room(room_id)?
            .ok_or_else(|| Error::NotFound("Room not found".into()))
    }

    fn check_candidate(&self, room_id: Uuid, candidate: &Candidate) -> Result<()> {
        match (self.ballot, candidate) {
            (BallotKind::Player, Candidate::Player(target)) => {
                if self.store.find_player(room_id, *target)?.is_none() {
                    return Err(Error::Validation(format!(
                        "Candidate {target} is not a player in this room"
                    )));
                }
                Ok(())
            }
            (BallotKind::Choice, Candidate::Choice(_)) => Ok(()),
            (BallotKind::Player, _) => Err(Error::Validation(
                "This room elects a player, not an option".into(),
            )),
            (BallotKind::Choice, _) => Err(Error::Validation(
                "This room votes on an option, not a player".into(),
            )),
        }
    }

    /// Cast a weighted leader ballot.
    ///
    /// The weight is the voter's score right now and is stored with the
    /// ballot. The ballot that completes the quorum resolves the election.
    #[instrument(skip(self))]
    pub fn vote_leader(
        &self,
        room_id: Uuid,
        voter: Uuid,
        candidate: Candidate,
    ) -> Result<LeaderVoteReceipt> {
        let (room, _) = authorize(self.store, room_id, voter, RoomAction::CastVote)?;
        if room.status != RoomStatus::FinalVote {
            return Err(Conflict::FinalVoteNotStarted.into());
        }
        self.check_candidate(room_id, &candidate)?;

        let weight = ScoreLedger::new(self.store).read(room_id, voter)?;
        let vote = LeaderVote::new(room_id, voter, candidate, weight);
        match self.store.insert_leader_vote(&vote) {
            Ok(true) => {}
            Ok(false) => {
                let current = self.load_room(room_id)?;
                warn!(phase = %current.status, "Leader ballot arrived outside the final vote");
                return Err(if current.status == RoomStatus::Resolved {
                    Conflict::AlreadyResolved {
                        phase: RoomStatus::Resolved,
                    }
                } else {
                    Conflict::FinalVoteNotStarted
                }
                .into());
            }
            Err(Error::Store(StoreError::UniqueViolation(_))) => {
                return Err(Conflict::AlreadyVoted.into())
            }
            Err(Error::Store(StoreError::ForeignKeyViolation(_))) => {
                return Err(Error::NotFound("Player not found".into()))
            }
            Err(e) => return Err(e),
        }
        debug!(%weight, "Leader vote recorded");

        let votes = self.store.count_leader_votes(room_id)?;
        let players = self.store.count_players(room_id)?;
        if votes < players {
            return Ok(LeaderVoteReceipt {
                vote,
                phase: room.status,
                result: None,
            });
        }

        let result = match self.resolve(room_id) {
            Ok(result) => Some(result),
            Err(Error::Conflict(Conflict::LeaderVoteTied)) => {
                info!(votes, "Leader quorum reached on a tie, waiting for the host");
                None
            }
            Err(e) if e.is_resolution_race() => {
                debug!(error = %e, "Another caller closed the room");
                None
            }
            Err(e) => return Err(e),
        };

        let phase = match result {
            Some(_) => RoomStatus::Resolved,
            None => self.load_room(room_id)?.status,
        };
        Ok(LeaderVoteReceipt {
            vote,
            phase,
            result,
        })
    }

    /// Close the election on the host's request
    #[instrument(skip(self))]
    pub fn resolve_final(&self, room_id: Uuid, caller: Uuid) -> Result<RoomResult> {
        authorize(self.store, room_id, caller, RoomAction::ResolveFinal)?;
        self.resolve(room_id)
    }

    fn resolve(&self, room_id: Uuid) -> Result<RoomResult> {
        for _ in 0..MAX_RETALLIES {
            if let Some(result) = self.try_resolve(room_id)? {
                return Ok(result);
            }
        }
        warn!("Ballots kept arriving while the room was being resolved");
        Err(Conflict::RoomChanged.into())
    }

    /// One weighted tally and commit; `None` when a ballot landed after the tally
    fn try_resolve(&self, room_id: Uuid) -> Result<Option<RoomResult>> {
        let room = self.load_room(room_id)?;
        match room.status {
            RoomStatus::FinalVote => {}
            RoomStatus::Resolved => {
                return Err(Conflict::AlreadyResolved {
                    phase: RoomStatus::Resolved,
                }
                .into())
            }
            _ => return Err(Conflict::FinalVoteNotStarted.into()),
        }

        let votes = self.store.list_leader_votes(room_id)?;
        if votes.is_empty() {
            return Err(Conflict::NoVotes.into());
        }
        let tally = WeightedTally::of(&votes);
        let (winner, winning_weight) = tally.winner().ok_or(Conflict::LeaderVoteTied)?;

        let players = ScoreLedger::new(self.store).read_all(room_id)?;
        let mvp_user_id = most_valuable(&players).map(|p| p.user_id);

        let result = RoomResult {
            room_id,
            winner,
            winning_weight,
            totals: tally.encoded(),
            mvp_user_id,
            resolved_at: Utc::now(),
        };
        assert_phase_transition(&room, RoomStatus::Resolved);

        if self.store.commit_final_resolution(room.version, &result)? == CasOutcome::Stale {
            let current = self.load_room(room_id)?;
            if current.status == RoomStatus::FinalVote {
                debug!("Final vote took a ballot after the tally, counting again");
                return Ok(None);
            }
            warn!(phase = %current.status, "Final resolution lost a race");
            return Err(Conflict::AlreadyResolved {
                phase: current.status,
            }
            .into());
        }

        if let Ok(room) = self.load_room(room_id) {
            assert_room_invariants(&room);
        }
        info!(%winner, %winning_weight, mvp = ?mvp_user_id, "Room resolved");

        emit(self.notifier, RoomEvent::Resolved { room_id });
        emit(
            self.notifier,
            RoomEvent::PhaseChanged {
                room_id,
                phase: RoomStatus::Resolved,
                chapter_order: None,
            },
        );
        emit(self.notifier, RoomEvent::RoomListChanged);
        Ok(Some(result))
    }

    /// The stored result of a resolved room
    #[instrument(skip(self))]
    pub fn get_final_result(&self, room_id: Uuid, caller: Uuid) -> Result<RoomResult> {
        authorize(self.store, room_id, caller, RoomAction::ViewResults)?;
        self.store
            .find_result(room_id)?
            .ok_or_else(|| Conflict::GameNotFinished.into())
    }

    /// Players by score, highest first
    #[instrument(skip(self))]
    pub fn get_leaderboard(&self, room_id: Uuid, caller: Uuid) -> Result<Vec<PlayerInfo>> {
        let (room, _) = authorize(self.store, room_id, caller, RoomAction::ViewResults)?;
        let standings = ScoreLedger::new(self.store).standings(room_id)?;

        Ok(standings
            .into_iter()
            .map(|p| PlayerInfo {
                is_host: room.is_host(p.user_id),
                user_id: p.user_id,
                nickname: p.nickname,
                score: p.score,
            })
            .collect())
    }
}
