//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use rusqlite::Connection;
use tracing::{info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema",
        sql: r#"
            -- Rooms; version is the compare-and-swap token for guarded transitions
            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                host_user_id TEXT NOT NULL,
                capacity INTEGER NOT NULL CHECK (capacity IN (3, 5, 7, 9)),
                status TEXT NOT NULL DEFAULT 'WAITING',
                current_chapter_order INTEGER,
                created_at TEXT NOT NULL,
                started_at TEXT,
                resolved_at TEXT,
                version INTEGER NOT NULL DEFAULT 0
            );

            -- One row per seat; score is in thousandths of a point
            CREATE TABLE IF NOT EXISTS players (
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                nickname TEXT NOT NULL,
                score INTEGER NOT NULL DEFAULT 0 CHECK (score >= 0),
                joined_at TEXT NOT NULL,
                PRIMARY KEY (room_id, user_id),
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            -- Per-room copy of the chapter catalog
            CREATE TABLE IF NOT EXISTS chapters (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                chapter_order INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                option_a_label TEXT NOT NULL,
                option_b_label TEXT NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE,
                UNIQUE(room_id, chapter_order)
            );

            CREATE TABLE IF NOT EXISTS chapter_votes (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                chapter_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                choice TEXT NOT NULL CHECK (choice IN ('A', 'B')),
                created_at TEXT NOT NULL,
                FOREIGN KEY (room_id, user_id) REFERENCES players(room_id, user_id) ON DELETE CASCADE,
                FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE CASCADE,
                UNIQUE(room_id, chapter_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS chapter_resolutions (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                chapter_id TEXT NOT NULL,
                majority TEXT NOT NULL CHECK (majority IN ('A', 'B')),
                count_a INTEGER NOT NULL,
                count_b INTEGER NOT NULL,
                resolved_at TEXT NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE,
                FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE CASCADE,
                UNIQUE(room_id, chapter_id)
            );

            -- weight is frozen at cast time
            CREATE TABLE IF NOT EXISTS leader_votes (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                voter_user_id TEXT NOT NULL,
                candidate TEXT NOT NULL,
                weight INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (room_id, voter_user_id) REFERENCES players(room_id, user_id) ON DELETE CASCADE,
                UNIQUE(room_id, voter_user_id)
            );

            CREATE TABLE IF NOT EXISTS room_results (
                room_id TEXT PRIMARY KEY,
                winner TEXT NOT NULL,
                winning_weight INTEGER NOT NULL,
                totals_json TEXT NOT NULL,
                mvp_user_id TEXT,
                resolved_at TEXT NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 2,
        description: "Add indexes for query performance",
        sql: r#"
            -- Lobby listing
            CREATE INDEX IF NOT EXISTS idx_rooms_status ON rooms(status);
            CREATE INDEX IF NOT EXISTS idx_rooms_created ON rooms(created_at);

            -- Membership lookups
            CREATE INDEX IF NOT EXISTS idx_players_user ON players(user_id);

            -- Tallies
            CREATE INDEX IF NOT EXISTS idx_chapter_votes_chapter ON chapter_votes(room_id, chapter_id);
            CREATE INDEX IF NOT EXISTS idx_leader_votes_room ON leader_votes(room_id);
        "#,
    },
];

/// Initialize the migrations table
fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
fn get_current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap_or(None);
    Ok(version.unwrap_or(0))
}

/// Record that a migration was applied
fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;
    info!(current_version, "Checking for pending migrations");

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );

            conn.execute_batch(migration.sql)?;
            record_migration(conn, migration)?;
        }
    }

    let new_version = get_current_version(conn)?;
    if new_version > current_version {
        info!(
            from = current_version,
            to = new_version,
            "Database schema updated"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latest_version() -> u32 {
        MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    #[test]
    fn test_migrations_run() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(get_current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(get_current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn test_migrations_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(
                migration.version as usize,
                i + 1,
                "Migration {} should have version {}",
                migration.description,
                i + 1
            );
        }
    }

    #[test]
    fn test_capacity_check_enforced_by_schema() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let err = conn
            .execute(
                "INSERT INTO rooms (id, host_user_id, capacity, created_at) VALUES ('r', 'h', 4, 'now')",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("CHECK"));
    }
}
