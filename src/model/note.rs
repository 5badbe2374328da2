use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use super::{id_params, placeholders, timestamp};
use crate::error::DbError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Note {
    pub id: i64,
    pub photo: i64,
    pub text: String,
    /// Serialized rich-text document; opaque to the core.
    #[ts(type = "unknown")]
    pub state: Value,
    pub created: i64,
    pub modified: i64,
    pub deleted: bool,
}

const COLUMNS: &str = "note_id, photo_id, text, state, created, modified, deleted IS NOT NULL";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Note> {
    let state: String = r.get(3)?;
    Ok(Note {
        id: r.get(0)?,
        photo: r.get(1)?,
        text: r.get(2)?,
        state: serde_json::from_str(&state).unwrap_or(Value::Null),
        created: r.get(4)?,
        modified: r.get(5)?,
        deleted: r.get(6)?,
    })
}

pub fn create(conn: &Connection, photo: i64, text: &str, state: &Value) -> Result<Note, DbError> {
    let now = timestamp();
    conn.execute(
        "INSERT INTO notes (photo_id, text, state, created, modified)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![photo, text, state.to_string(), now],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or_else(|| DbError::Invalid(format!("note {id} vanished")))
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Note>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM notes WHERE note_id = ?1");
    Ok(conn.query_row(&sql, params![id], from_row).optional()?)
}

pub fn load(conn: &Connection, ids: &[i64]) -> Result<Vec<Note>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {COLUMNS} FROM notes WHERE note_id IN ({}) ORDER BY note_id",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let notes = stmt
        .query_map(params_from_iter(id_params(ids)), from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(notes)
}

/// Live note ids attached to `photo`.
pub fn of_photo(conn: &Connection, photo: i64) -> Result<Vec<i64>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT note_id FROM notes WHERE photo_id = ?1 AND deleted IS NULL ORDER BY note_id",
    )?;
    let ids = stmt
        .query_map(params![photo], |r| r.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

pub fn save(conn: &Connection, id: i64, text: &str, state: &Value) -> Result<(), DbError> {
    let changed = conn.execute(
        "UPDATE notes SET text = ?1, state = ?2, modified = ?3 WHERE note_id = ?4",
        params![text, state.to_string(), timestamp(), id],
    )?;
    if changed == 0 {
        return Err(DbError::Invalid(format!("note {id} not found")));
    }
    Ok(())
}

pub fn delete(conn: &Connection, ids: &[i64]) -> Result<(), DbError> {
    let mut stmt = conn.prepare("UPDATE notes SET deleted = ?1 WHERE note_id = ?2")?;
    let now = timestamp();
    for id in ids {
        stmt.execute(params![now, id])?;
    }
    Ok(())
}

pub fn restore(conn: &Connection, ids: &[i64]) -> Result<(), DbError> {
    let mut stmt = conn.prepare("UPDATE notes SET deleted = NULL WHERE note_id = ?1")?;
    for id in ids {
        stmt.execute(params![id])?;
    }
    Ok(())
}
