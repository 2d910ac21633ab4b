//! Survivote Core Library
//!
//! Room lifecycle, chapter voting, weighted leader election and score
//! keeping for the survival vote game, over a SQLite store.

pub mod chapters;
pub mod config;
pub mod election;
pub mod error;
pub mod game;
pub mod invariants;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod permissions;
pub mod rooms;
pub mod storage;

pub use chapters::{Catalog, CatalogEntry, ChapterEngine, ChapterOutcome, ChapterVoteReceipt, Tally};
pub use config::{BallotKind, GameSettings};
pub use election::{LeaderElection, LeaderVoteReceipt, WeightedTally};
pub use error::{Conflict, Error, Result, StoreError};
pub use game::Game;
pub use ledger::{most_valuable, ScoreLedger};
pub use models::*;
pub use notify::{BroadcastNotifier, NoopNotifier, Notifier, NotifyError, RoomEvent};
pub use permissions::*;
pub use rooms::RoomManager;
pub use storage::{
    CasOutcome, ChapterCommit, ChapterRepository, Database, PlayerRepository, ResultRepository,
    RoomRepository, Storage, VoteRepository,
};
