//! Room result storage operations

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{influence_from_sql, parse_candidate, parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::{Influence, RoomResult};

pub struct ResultStore<'a> {
    conn: &'a Connection,
}

impl<'a> ResultStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    #[instrument(skip(self))]
    pub fn find(&self, room_id: Uuid) -> Result<Option<RoomResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT room_id, winner, winning_weight, totals_json, mvp_user_id, resolved_at
             FROM room_results WHERE room_id = ?1",
        )?;

        let row = stmt
            .query_row(params![room_id.to_string()], |row| {
                let mvp: Option<String> = row.get(4)?;
                Ok((
                    RoomResult {
                        room_id: parse_uuid(&row.get::<_, String>(0)?)?,
                        winner: parse_candidate(&row.get::<_, String>(1)?)?,
                        winning_weight: influence_from_sql(row.get(2)?),
                        totals: BTreeMap::new(),
                        mvp_user_id: mvp.as_deref().map(parse_uuid).transpose()?,
                        resolved_at: parse_datetime(&row.get::<_, String>(5)?)?,
                    },
                    row.get::<_, String>(3)?,
                ))
            })
            .optional()?;

        match row {
            Some((mut result, totals_json)) => {
                let totals: BTreeMap<String, Influence> = serde_json::from_str(&totals_json)?;
                result.totals = totals;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }
}
