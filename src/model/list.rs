use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::timestamp;
use crate::error::DbError;

/// The implicit root every top-level list hangs off.
pub const ROOT: i64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ListEntry {
    pub id: i64,
    pub name: String,
    pub parent: Option<i64>,
    pub children: Vec<i64>,
}

/// Every list including the root, with children in display order.
pub fn load(conn: &Connection) -> Result<Vec<ListEntry>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT list_id, name, parent_list_id FROM lists ORDER BY parent_list_id, position, list_id",
    )?;
    let mut lists = stmt
        .query_map([], |r| {
            Ok(ListEntry {
                id: r.get(0)?,
                name: r.get(1)?,
                parent: r.get(2)?,
                children: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let links: Vec<(i64, i64)> = lists
        .iter()
        .filter_map(|l| l.parent.map(|p| (p, l.id)))
        .collect();
    for (parent, child) in links {
        if let Some(entry) = lists.iter_mut().find(|l| l.id == parent) {
            entry.children.push(child);
        }
    }
    Ok(lists)
}

pub fn create(conn: &Connection, name: &str, parent: Option<i64>) -> Result<ListEntry, DbError> {
    if name.trim().is_empty() {
        return Err(DbError::Invalid("list name must not be empty".into()));
    }
    let parent = parent.unwrap_or(ROOT);
    let position: i64 = conn.query_row(
        "SELECT count(*) FROM lists WHERE parent_list_id = ?1",
        params![parent],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO lists (name, parent_list_id, position, created) VALUES (?1, ?2, ?3, ?4)",
        params![name, parent, position, timestamp()],
    )?;
    Ok(ListEntry {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        parent: Some(parent),
        children: Vec::new(),
    })
}

pub fn delete(conn: &Connection, id: i64) -> Result<(), DbError> {
    if id == ROOT {
        return Err(DbError::Invalid("the root list cannot be deleted".into()));
    }
    let changed = conn.execute("DELETE FROM lists WHERE list_id = ?1", params![id])?;
    if changed == 0 {
        return Err(DbError::Invalid(format!("list {id} not found")));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn lists_form_a_tree_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(&dir.path().join("p.folio")).await.unwrap();
        db.migrate().await.unwrap();

        let a = db.call(|c| create(c, "Letters", None)).await.unwrap();
        let parent = a.id;
        let b = db.call(move |c| create(c, "1901", Some(parent))).await.unwrap();
        let lists = db.call(load).await.unwrap();
        let root = lists.iter().find(|l| l.id == ROOT).unwrap();
        assert_eq!(root.children, vec![a.id]);
        let letters = lists.iter().find(|l| l.id == a.id).unwrap();
        assert_eq!(letters.children, vec![b.id]);

        assert!(db.call(|c| delete(c, ROOT)).await.is_err());
        db.call(move |c| delete(c, parent)).await.unwrap();
        assert_eq!(db.call(load).await.unwrap().len(), 1);
    }
}
