//! Where the CLI keeps its settings and database

use std::env;
use std::path::PathBuf;

use directories::ProjectDirs;
use survivote_core::{Database, Error, GameSettings, Result};

const SETTINGS_FILE: &str = "survivote.toml";
const DATABASE_FILE: &str = "survivote.db";

/// Environment override for the database location
pub const DATABASE_ENV: &str = "SURVIVOTE_DB";

pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "survivote", "survivote").ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine data directory",
            ))
        })?;

        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_dir().to_path_buf(),
        })
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    /// `SURVIVOTE_DB`, then `database_path` from settings, then the data dir
    pub fn database_file(&self, settings: &GameSettings) -> PathBuf {
        env::var(DATABASE_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| settings.database_path.clone())
            .unwrap_or_else(|| self.data_dir.join(DATABASE_FILE))
    }
}

/// Load settings and open the database they point at
pub fn open(paths: &AppPaths) -> Result<(GameSettings, Database)> {
    let settings = GameSettings::load(&paths.settings_file())?;
    let db_path = paths.database_file(&settings);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::open(&db_path)?;
    tracing::info!(path = %db_path.display(), schema = db.schema_version(), "Database ready");
    Ok((settings, db))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_wins_over_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths {
            config_dir: dir.path().join("config"),
            data_dir: dir.path().join("data"),
        };
        let mut settings = GameSettings::default();

        if env::var(DATABASE_ENV).is_err() {
            assert_eq!(
                paths.database_file(&settings),
                dir.path().join("data").join(DATABASE_FILE)
            );
            settings.database_path = Some(dir.path().join("custom.db"));
            assert_eq!(paths.database_file(&settings), dir.path().join("custom.db"));
        }
    }
}
