//! Vote models for chapters and the leader election

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Influence;

/// A chapter option
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
}

impl Choice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Choice::A => "A",
            Choice::B => "B",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Choice::A),
            "B" => Some(Choice::B),
            _ => None,
        }
    }

    /// Parse user input, rejecting anything but `A` or `B`
    pub fn parse(s: &str) -> crate::Result<Self> {
        Self::from_str(s.trim())
            .ok_or_else(|| crate::Error::Validation(format!("Invalid choice: {s:?}")))
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One player's vote on one chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterVote {
    pub id: Uuid,
    pub room_id: Uuid,
    pub chapter_id: Uuid,
    pub user_id: Uuid,
    pub choice: Choice,
}

impl ChapterVote {
    pub fn new(room_id: Uuid, chapter_id: Uuid, user_id: Uuid, choice: Choice) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            chapter_id,
            user_id,
            choice,
        }
    }
}

/// Outcome recorded when a chapter resolves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterResolution {
    pub id: Uuid,
    pub room_id: Uuid,
    pub chapter_id: Uuid,
    pub majority: Choice,
    pub count_a: u32,
    pub count_b: u32,
    pub resolved_at: DateTime<Utc>,
}

/// What a leader ballot is cast for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Candidate {
    /// A player in the room
    Player(Uuid),
    /// One side of the final A/B question
    Choice(Choice),
}

impl Candidate {
    /// Encode for the `candidate` column
    pub fn encode(&self) -> String {
        match self {
            Candidate::Player(id) => format!("player:{id}"),
            Candidate::Choice(c) => format!("choice:{c}"),
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        let (kind, value) = s.split_once(':')?;
        match kind {
            "player" => Uuid::parse_str(value).ok().map(Candidate::Player),
            "choice" => Choice::from_str(value).map(Candidate::Choice),
            _ => None,
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Player(id) => write!(f, "player {id}"),
            Candidate::Choice(c) => write!(f, "option {c}"),
        }
    }
}

/// A weighted leader ballot. `weight` is frozen at cast time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderVote {
    pub id: Uuid,
    pub room_id: Uuid,
    pub voter_user_id: Uuid,
    pub candidate: Candidate,
    pub weight: Influence,
}

impl LeaderVote {
    pub fn new(room_id: Uuid, voter_user_id: Uuid, candidate: Candidate, weight: Influence) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            voter_user_id,
            candidate,
            weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_parse_rejects_garbage() {
        assert_eq!(Choice::parse(" A ").unwrap(), Choice::A);
        assert!(matches!(
            Choice::parse("C"),
            Err(crate::Error::Validation(_))
        ));
    }

    #[test]
    fn test_candidate_column_encoding() {
        let id = Uuid::new_v4();
        let player = Candidate::Player(id);
        assert_eq!(Candidate::decode(&player.encode()), Some(player));
        assert_eq!(
            Candidate::decode("choice:B"),
            Some(Candidate::Choice(Choice::B))
        );
        assert_eq!(Candidate::decode("choice:C"), None);
        assert_eq!(Candidate::decode("garbage"), None);
    }
}
