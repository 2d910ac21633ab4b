//! Game settings
//!
//! Loaded from `survivote.toml`; every field has a default so a missing file
//! or a partial file is fine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chapters::Catalog;
use crate::error::{Error, Result};
use crate::models::Influence;

/// What players vote for in the leader election
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BallotKind {
    /// Ballots name a player in the room
    #[default]
    Player,
    /// Ballots pick option A or B of the closing question
    Choice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    /// Influence granted to each majority voter when a chapter resolves
    pub chapter_reward: f64,
    pub leader_ballot: BallotKind,
    /// Optional TOML chapter catalog replacing the built-in story
    pub catalog_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            chapter_reward: 0.1,
            leader_ballot: BallotKind::Player,
            catalog_path: None,
            database_path: None,
        }
    }
}

impl GameSettings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings: GameSettings =
            toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file, falling back to defaults if it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&contents)?;
        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.chapter_reward.is_finite() || self.chapter_reward <= 0.0 {
            return Err(Error::Config(format!(
                "chapter_reward must be a positive number, got {}",
                self.chapter_reward
            )));
        }
        Ok(())
    }

    pub fn reward(&self) -> Influence {
        Influence::from_points(self.chapter_reward)
    }

    /// Resolve the chapter catalog these settings point at
    pub fn catalog(&self) -> Result<Catalog> {
        match &self.catalog_path {
            Some(path) => Catalog::load(path),
            None => Ok(Catalog::builtin()),
        }
    }
}
