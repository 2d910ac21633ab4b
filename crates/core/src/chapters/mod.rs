//! Chapter engine
//!
//! Drives the PLAYING phase: starting the game, collecting A/B votes on the
//! active chapter and resolving it. A chapter resolves either when the host
//! asks or as soon as every seated player has voted. The reward batch and
//! the phase change commit under one compare-and-swap, so however many
//! callers race to resolve the same chapter, the majority is rewarded once.
//! Votes are only stored while their chapter is active and each one bumps
//! the room version, so a tally that missed a vote is taken again.

mod catalog;

pub use catalog::{Catalog, CatalogEntry};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Conflict, Error, Result, StoreError};
use crate::invariants::{assert_phase_transition, assert_room_invariants};
use crate::ledger::ScoreLedger;
use crate::models::{
    Chapter, ChapterResolution, ChapterVote, Choice, GameState, Influence, Room, RoomStatus,
};
use crate::notify::{emit, Notifier, RoomEvent};
use crate::permissions::{authorize, RoomAction};
use crate::storage::{CasOutcome, ChapterCommit, Storage};

/// How many times a resolution re-reads the votes after losing its swap to a new ballot
const MAX_RETALLIES: usize = 8;

/// Vote counts for one chapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub count_a: u32,
    pub count_b: u32,
}

impl Tally {
    pub fn of(votes: &[ChapterVote]) -> Self {
        votes.iter().fold(Self::default(), |mut t, v| {
            match v.choice {
                Choice::A => t.count_a += 1,
                Choice::B => t.count_b += 1,
            }
            t
        })
    }

    pub fn total(&self) -> u32 {
        self.count_a + self.count_b
    }

    /// Strict majority; `None` on a tie
    pub fn majority(&self) -> Option<Choice> {
        use std::cmp::Ordering;

        match self.count_a.cmp(&self.count_b) {
            Ordering::Greater => Some(Choice::A),
            Ordering::Less => Some(Choice::B),
            Ordering::Equal => None,
        }
    }
}

/// What a resolved chapter produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterOutcome {
    pub chapter_order: u32,
    pub majority: Choice,
    pub count_a: u32,
    pub count_b: u32,
    /// Players credited with the chapter reward
    pub rewarded: Vec<Uuid>,
    /// Room state right after the resolution committed
    pub state: GameState,
}

/// Returned from a chapter vote
#[derive(Debug, Clone)]
pub struct ChapterVoteReceipt {
    pub vote: ChapterVote,
    /// Room phase after the vote, re-read if the vote completed the quorum
    pub phase: RoomStatus,
    /// Present when this vote triggered the resolution
    pub outcome: Option<ChapterOutcome>,
}

pub struct ChapterEngine<'a, S> {
    store: &'a S,
    notifier: &'a dyn Notifier,
    catalog: &'a Catalog,
    reward: Influence,
}

impl<'a, S: Storage> ChapterEngine<'a, S> {
    pub fn new(
        store: &'a S,
        notifier: &'a dyn Notifier,
        catalog: &'a Catalog,
        reward: Influence,
    ) -> Self {
        Self {
            store,
            notifier,
            catalog,
            reward,
        }
    }

    fn load_room(&self, room_id: Uuid) -> Result<Room> {
        self.store
            .find_room(room_id)?
            .ok_or_else(|| Error::NotFound("Room not found".into()))
    }

    /// Move a full-enough room into chapter 1. Host only.
    #[instrument(skip(self))]
    pub fn start_game(&self, room_id: Uuid, caller: Uuid) -> Result<GameState> {
        let (room, _) = authorize(self.store, room_id, caller, RoomAction::StartGame)?;
        if room.status != RoomStatus::Waiting {
            return Err(Conflict::GameAlreadyStarted.into());
        }

        let players = self.store.count_players(room_id)?;
        if players < 3 || players % 2 == 0 {
            return Err(Conflict::InvalidPlayerCount.into());
        }

        let chapters = self.catalog.chapters_for(room_id);
        assert_phase_transition(&room, RoomStatus::Playing);
        match self.store.start_room(room_id, room.version, &chapters)? {
            CasOutcome::Applied => {}
            CasOutcome::Stale => {
                let current = self.load_room(room_id)?;
                warn!(status = %current.status, "Start lost a race");
                return Err(if current.status == RoomStatus::Waiting {
                    Conflict::RoomChanged
                } else {
                    Conflict::GameAlreadyStarted
                }
                .into());
            }
        }

        let room = self.load_room(room_id)?;
        assert_room_invariants(&room);
        info!(players, chapters = chapters.len(), "Game started");

        emit(
            self.notifier,
            RoomEvent::PhaseChanged {
                room_id,
                phase: room.status,
                chapter_order: room.current_chapter_order,
            },
        );
        emit(self.notifier, RoomEvent::RoomListChanged);
        Ok(GameState::from(&room))
    }

    /// The chapter players are voting on right now
    #[instrument(skip(self))]
    pub fn get_current_chapter(&self, room_id: Uuid, caller: Uuid) -> Result<Chapter> {
        let (room, _) = authorize(self.store, room_id, caller, RoomAction::ViewRoom)?;
        let order = match (room.status, room.current_chapter_order) {
            (RoomStatus::Playing, Some(order)) => order,
            _ => return Err(Conflict::NoActiveChapter.into()),
        };

        self.store
            .find_chapter_by_order(room_id, order)?
            .ok_or_else(|| Error::NotFound("Chapter not found".into()))
    }

    /// All chapters seeded into a room; empty before the game starts
    #[instrument(skip(self))]
    pub fn list_chapters(&self, room_id: Uuid, caller: Uuid) -> Result<Vec<Chapter>> {
        authorize(self.store, room_id, caller, RoomAction::ViewRoom)?;
        self.store.list_chapters(room_id)
    }

    /// Votes cast on one chapter, in casting order
    #[instrument(skip(self))]
    pub fn get_chapter_votes(
        &self,
        room_id: Uuid,
        chapter_id: Uuid,
        caller: Uuid,
    ) -> Result<Vec<ChapterVote>> {
        authorize(self.store, room_id, caller, RoomAction::ViewRoom)?;
        if self.store.find_chapter(room_id, chapter_id)?.is_none() {
            return Err(Error::NotFound("Chapter not found".into()));
        }
        self.store.list_chapter_votes(room_id, chapter_id)
    }

    /// Recorded chapter outcomes in chapter order
    #[instrument(skip(self))]
    pub fn list_resolutions(&self, room_id: Uuid, caller: Uuid) -> Result<Vec<ChapterResolution>> {
        authorize(self.store, room_id, caller, RoomAction::ViewResults)?;
        self.store.list_resolutions(room_id)
    }

    /// Cast one vote on the active chapter.
    ///
    /// The vote that completes the quorum resolves the chapter. A tie at
    /// quorum leaves the room as it is; the vote still stands.
    #[instrument(skip(self))]
    pub fn vote_chapter(
        &self,
        room_id: Uuid,
        chapter_id: Uuid,
        user_id: Uuid,
        choice: Choice,
    ) -> Result<ChapterVoteReceipt> {
        let (room, _) = authorize(self.store, room_id, user_id, RoomAction::CastVote)?;
        match room.status {
            RoomStatus::Playing => {}
            RoomStatus::Waiting => return Err(Conflict::GameNotStarted.into()),
            _ => return Err(Conflict::ChapterNotActive.into()),
        }

        let chapter = self
            .store
            .find_chapter(room_id, chapter_id)?
            .ok_or_else(|| Error::NotFound("Chapter not found".into()))?;
        if Some(chapter.order) != room.current_chapter_order {
            return Err(Conflict::ChapterNotActive.into());
        }

        let vote = ChapterVote::new(room_id, chapter_id, user_id, choice);
        match self.store.insert_chapter_vote(&vote) {
            Ok(true) => {}
            Ok(false) => {
                let current = self.load_room(room_id)?;
                warn!(
                    order = chapter.order,
                    phase = %current.status,
                    "Vote arrived after the chapter closed"
                );
                return Err(Conflict::ChapterNotActive.into());
            }
            Err(Error::Store(StoreError::UniqueViolation(_))) => {
                return Err(Conflict::AlreadyVoted.into())
            }
            Err(Error::Store(StoreError::ForeignKeyViolation(_))) => {
                return Err(Error::NotFound("Player or chapter not found".into()))
            }
            Err(e) => return Err(e),
        }
        debug!("Chapter vote recorded");

        let votes = self.store.count_chapter_votes(room_id, chapter_id)?;
        let players = self.store.count_players(room_id)?;
        if votes < players {
            return Ok(ChapterVoteReceipt {
                vote,
                phase: room.status,
                outcome: None,
            });
        }

        let outcome = match self.resolve(room_id, chapter_id) {
            Ok(outcome) => Some(outcome),
            Err(Error::Conflict(Conflict::VoteTied)) => {
                info!(votes, "Quorum reached on a tie, waiting for the host");
                None
            }
            Err(e) if e.is_resolution_race() => {
                debug!(error = %e, "Another caller resolved the chapter");
                None
            }
            Err(e) => return Err(e),
        };

        let phase = match &outcome {
            Some(o) => o.state.phase,
            None => self.load_room(room_id)?.status,
        };
        Ok(ChapterVoteReceipt {
            vote,
            phase,
            outcome,
        })
    }

    /// Resolve the active chapter on the host's request
    #[instrument(skip(self))]
    pub fn resolve_chapter(
        &self,
        room_id: Uuid,
        chapter_id: Uuid,
        caller: Uuid,
    ) -> Result<ChapterOutcome> {
        authorize(self.store, room_id, caller, RoomAction::ResolveChapter)?;
        self.resolve(room_id, chapter_id)
    }

    fn resolve(&self, room_id: Uuid, chapter_id: Uuid) -> Result<ChapterOutcome> {
        for _ in 0..MAX_RETALLIES {
            if let Some(outcome) = self.try_resolve(room_id, chapter_id)? {
                return Ok(outcome);
            }
        }
        warn!("Votes kept arriving while the chapter was being resolved");
        Err(Conflict::RoomChanged.into())
    }

    /// One tally and commit; `None` when a vote landed after the tally
    fn try_resolve(&self, room_id: Uuid, chapter_id: Uuid) -> Result<Option<ChapterOutcome>> {
        let room = self.load_room(room_id)?;
        let order = match (room.status, room.current_chapter_order) {
            (RoomStatus::Playing, Some(order)) => order,
            (RoomStatus::Waiting, _) => return Err(Conflict::GameNotStarted.into()),
            _ => return Err(Conflict::ChapterNotActive.into()),
        };

        let chapter = self
            .store
            .find_chapter(room_id, chapter_id)?
            .ok_or_else(|| Error::NotFound("Chapter not found".into()))?;
        if chapter.order != order {
            return Err(Conflict::ChapterNotActive.into());
        }

        let votes = self.store.list_chapter_votes(room_id, chapter_id)?;
        if votes.is_empty() {
            return Err(Conflict::NoVotes.into());
        }
        let tally = Tally::of(&votes);
        let majority = tally.majority().ok_or(Conflict::VoteTied)?;

        let winners: Vec<Uuid> = votes
            .iter()
            .filter(|v| v.choice == majority)
            .map(|v| v.user_id)
            .collect();
        let credit = ScoreLedger::new(self.store).credit(&winners, self.reward)?;

        let next_order = self
            .store
            .find_chapter_by_order(room_id, order + 1)?
            .map(|c| c.order);

        let commit = ChapterCommit {
            room_id,
            expected_version: room.version,
            expected_order: order,
            next_order,
            resolution: ChapterResolution {
                id: Uuid::new_v4(),
                room_id,
                chapter_id,
                majority,
                count_a: tally.count_a,
                count_b: tally.count_b,
                resolved_at: Utc::now(),
            },
            credit,
        };
        let next_phase = match next_order {
            Some(_) => RoomStatus::Playing,
            None => RoomStatus::FinalVote,
        };
        assert_phase_transition(&room, next_phase);

        if self.store.commit_chapter_resolution(&commit)? == CasOutcome::Stale {
            let current = self.load_room(room_id)?;
            if current.status == RoomStatus::Playing && current.current_chapter_order == Some(order)
            {
                debug!(order, "Chapter took a vote after the tally, counting again");
                return Ok(None);
            }
            warn!(order, phase = %current.status, "Chapter resolution lost a race");
            return Err(Conflict::AlreadyResolved {
                phase: current.status,
            }
            .into());
        }

        let room = self.load_room(room_id)?;
        assert_room_invariants(&room);
        info!(
            order,
            %majority,
            count_a = tally.count_a,
            count_b = tally.count_b,
            next = ?next_order,
            "Chapter resolved"
        );

        emit(
            self.notifier,
            RoomEvent::PhaseChanged {
                room_id,
                phase: room.status,
                chapter_order: room.current_chapter_order,
            },
        );
        emit(self.notifier, RoomEvent::PlayersChanged { room_id });

        Ok(Some(ChapterOutcome {
            chapter_order: order,
            majority,
            count_a: tally.count_a,
            count_b: tally.count_b,
            rewarded: commit.credit.user_ids,
            state: GameState::from(&room),
        }))
    }
}
