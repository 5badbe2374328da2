use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{id_params, placeholders, timestamp};
use crate::error::DbError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Item {
    pub id: i64,
    /// Photo ids in display order. Trashed photos are excluded.
    pub photos: Vec<i64>,
    pub created: i64,
    pub modified: i64,
    pub deleted: bool,
}

pub fn create(conn: &Connection) -> Result<Item, DbError> {
    let now = timestamp();
    conn.execute(
        "INSERT INTO subjects (created, modified) VALUES (?1, ?1)",
        params![now],
    )?;
    let id = conn.last_insert_rowid();
    conn.execute("INSERT INTO items (id) VALUES (?1)", params![id])?;
    Ok(Item {
        id,
        photos: Vec::new(),
        created: now,
        modified: now,
        deleted: false,
    })
}

pub fn load(conn: &Connection, ids: &[i64]) -> Result<Vec<Item>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, created, modified, deleted IS NOT NULL
           FROM items JOIN subjects USING (id) LEFT OUTER JOIN trash USING (id)
          WHERE id IN ({})
          ORDER BY id",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(id_params(ids)), |r| {
        Ok(Item {
            id: r.get(0)?,
            photos: Vec::new(),
            created: r.get(1)?,
            modified: r.get(2)?,
            deleted: r.get(3)?,
        })
    })?;
    let mut items = rows.collect::<Result<Vec<_>, _>>()?;
    for item in &mut items {
        item.photos = super::photo::order(conn, item.id)?;
    }
    Ok(items)
}

/// Ids of every item not in the trash.
pub fn all(conn: &Connection) -> Result<Vec<i64>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM items LEFT OUTER JOIN trash USING (id)
          WHERE deleted IS NULL ORDER BY id",
    )?;
    let ids = stmt
        .query_map([], |r| r.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

pub fn exists(conn: &Connection, id: i64) -> Result<bool, DbError> {
    let n: i64 = conn.query_row(
        "SELECT count(*) FROM items LEFT OUTER JOIN trash USING (id)
          WHERE id = ?1 AND deleted IS NULL",
        params![id],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

pub fn touch(conn: &Connection, id: i64) -> Result<(), DbError> {
    conn.execute(
        "UPDATE subjects SET modified = ?1 WHERE id = ?2",
        params![timestamp(), id],
    )?;
    Ok(())
}

/// Move items to the trash. Rows are never dropped.
pub fn delete(conn: &Connection, ids: &[i64]) -> Result<(), DbError> {
    let now = timestamp();
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO trash (id, deleted) VALUES (?1, ?2)")?;
    for id in ids {
        stmt.execute(params![id, now])?;
    }
    Ok(())
}

pub fn restore(conn: &Connection, ids: &[i64]) -> Result<(), DbError> {
    let sql = format!("DELETE FROM trash WHERE id IN ({})", placeholders(ids.len()));
    if !ids.is_empty() {
        conn.execute(&sql, params_from_iter(id_params(ids)))?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn delete_marks_trash_and_restore_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(&dir.path().join("p.folio")).await.unwrap();
        db.migrate().await.unwrap();

        let (a, b) = db
            .transaction(|tx| Ok((create(tx)?, create(tx)?)))
            .await
            .unwrap();
        let (a, b) = (a.id, b.id);
        db.call(move |c| delete(c, &[a])).await.unwrap();

        assert_eq!(db.call(all).await.unwrap(), vec![b]);
        let loaded = db.call(move |c| load(c, &[a])).await.unwrap();
        assert!(loaded[0].deleted);

        db.call(move |c| restore(c, &[a])).await.unwrap();
        assert_eq!(db.call(all).await.unwrap(), vec![a, b]);
        assert!(db.call(move |c| exists(c, a)).await.unwrap());
    }
}
