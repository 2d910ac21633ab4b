//! Chapter storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_choice, parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::{Chapter, ChapterResolution};

const CHAPTER_COLUMNS: &str =
    "id, room_id, chapter_order, title, description, option_a_label, option_b_label";

fn chapter_from_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        room_id: parse_uuid(&row.get::<_, String>(1)?)?,
        order: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        option_a_label: row.get(5)?,
        option_b_label: row.get(6)?,
    })
}

pub struct ChapterStore<'a> {
    conn: &'a Connection,
}

impl<'a> ChapterStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// List chapters in catalog order
    #[instrument(skip(self))]
    pub fn list_for_room(&self, room_id: Uuid) -> Result<Vec<Chapter>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE room_id = ?1 ORDER BY chapter_order"
        ))?;

        let chapters = stmt
            .query_map(params![room_id.to_string()], chapter_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(chapters)
    }

    /// Find chapter by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, room_id: Uuid, chapter_id: Uuid) -> Result<Option<Chapter>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE room_id = ?1 AND id = ?2"
        ))?;

        let chapter = stmt
            .query_row(
                params![room_id.to_string(), chapter_id.to_string()],
                chapter_from_row,
            )
            .optional()?;

        Ok(chapter)
    }

    /// Find chapter by catalog position
    #[instrument(skip(self))]
    pub fn find_by_order(&self, room_id: Uuid, order: u32) -> Result<Option<Chapter>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE room_id = ?1 AND chapter_order = ?2"
        ))?;

        let chapter = stmt
            .query_row(params![room_id.to_string(), order], chapter_from_row)
            .optional()?;

        Ok(chapter)
    }

    /// List resolved chapter outcomes
    #[instrument(skip(self))]
    pub fn list_resolutions(&self, room_id: Uuid) -> Result<Vec<ChapterResolution>> {
        let mut stmt = self.conn.prepare(
            "SELECT cr.id, cr.room_id, cr.chapter_id, cr.majority, cr.count_a, cr.count_b, cr.resolved_at
             FROM chapter_resolutions cr
             INNER JOIN chapters c ON c.id = cr.chapter_id
             WHERE cr.room_id = ?1
             ORDER BY c.chapter_order",
        )?;

        let resolutions = stmt
            .query_map(params![room_id.to_string()], |row| {
                Ok(ChapterResolution {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    room_id: parse_uuid(&row.get::<_, String>(1)?)?,
                    chapter_id: parse_uuid(&row.get::<_, String>(2)?)?,
                    majority: parse_choice(&row.get::<_, String>(3)?)?,
                    count_a: row.get(4)?,
                    count_b: row.get(5)?,
                    resolved_at: parse_datetime(&row.get::<_, String>(6)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(resolutions)
    }
}
