use std::path::PathBuf;

use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{id_params, placeholders, timestamp};
use crate::action::params::{FieldUpdate, PhotoFields};
use crate::error::DbError;
use crate::image::ImageInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Photo {
    pub id: i64,
    pub item: i64,
    pub path: PathBuf,
    pub checksum: String,
    pub size: u64,
    pub mimetype: String,
    pub title: Option<String>,
    pub date: Option<String>,
    /// Clockwise degrees in `0..360`.
    pub rotation: i32,
    pub broken: bool,
    /// When the source file was last verified.
    pub consolidated: Option<i64>,
    pub deleted: bool,
}

impl Photo {
    /// Current values of the fields named in `fields`, as an update that restores them.
    pub fn fields_like(&self, fields: &PhotoFields) -> PhotoFields {
        PhotoFields {
            title: fields
                .title
                .as_ref()
                .map(|_| FieldUpdate::from_option(self.title.clone())),
            date: fields
                .date
                .as_ref()
                .map(|_| FieldUpdate::from_option(self.date.clone())),
        }
    }
}

const COLUMNS: &str = "id, item_id, path, checksum, size, mimetype, title, date,
    rotation, broken, consolidated, deleted IS NOT NULL";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Photo> {
    let path: String = r.get(2)?;
    let size: i64 = r.get(4)?;
    Ok(Photo {
        id: r.get(0)?,
        item: r.get(1)?,
        path: PathBuf::from(path),
        checksum: r.get(3)?,
        size: u64::try_from(size).unwrap_or(0),
        mimetype: r.get(5)?,
        title: r.get(6)?,
        date: r.get(7)?,
        rotation: r.get(8)?,
        broken: r.get(9)?,
        consolidated: r.get(10)?,
        deleted: r.get(11)?,
    })
}

pub fn create(
    conn: &Connection,
    item: i64,
    image: &ImageInfo,
    position: usize,
) -> Result<Photo, DbError> {
    let now = timestamp();
    conn.execute(
        "INSERT INTO subjects (created, modified) VALUES (?1, ?1)",
        params![now],
    )?;
    let id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO photos (id, item_id, position, path, checksum, size, mimetype)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            item,
            i64::try_from(position).unwrap_or(i64::MAX),
            image.path.to_string_lossy().into_owned(),
            image.checksum,
            i64::try_from(image.size).unwrap_or(i64::MAX),
            image.mimetype,
        ],
    )?;
    get(conn, id)?.ok_or_else(|| DbError::Invalid(format!("photo {id} vanished")))
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Photo>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM photos LEFT OUTER JOIN trash USING (id) WHERE id = ?1"
    );
    Ok(conn.query_row(&sql, params![id], from_row).optional()?)
}

pub fn load(conn: &Connection, ids: &[i64]) -> Result<Vec<Photo>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {COLUMNS} FROM photos LEFT OUTER JOIN trash USING (id)
          WHERE id IN ({}) ORDER BY item_id, position",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let photos = stmt
        .query_map(params_from_iter(id_params(ids)), from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(photos)
}

/// Ids of every photo not in the trash.
pub fn all(conn: &Connection) -> Result<Vec<i64>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM photos LEFT OUTER JOIN trash USING (id)
          WHERE deleted IS NULL ORDER BY item_id, position",
    )?;
    let ids = stmt
        .query_map([], |r| r.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Photo ids of `item` in display order, skipping the trash.
pub fn order(conn: &Connection, item: i64) -> Result<Vec<i64>, DbError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM photos LEFT OUTER JOIN trash USING (id)
          WHERE item_id = ?1 AND deleted IS NULL
          ORDER BY position, id",
    )?;
    let ids = stmt
        .query_map(params![item], |r| r.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Store `ids` as the full display order of `item`.
pub fn set_order(conn: &Connection, item: i64, ids: &[i64]) -> Result<(), DbError> {
    let mut stmt =
        conn.prepare_cached("UPDATE photos SET position = ?1 WHERE id = ?2 AND item_id = ?3")?;
    for (position, id) in ids.iter().enumerate() {
        stmt.execute(params![i64::try_from(position).unwrap_or(i64::MAX), id, item])?;
    }
    Ok(())
}

/// Checksums of the photos currently in `item`.
pub fn checksums(conn: &Connection, item: i64) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT checksum FROM photos LEFT OUTER JOIN trash USING (id)
          WHERE item_id = ?1 AND deleted IS NULL",
    )?;
    let sums = stmt
        .query_map(params![item], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(sums)
}

/// The item each of `ids` belongs to. Fails if any photo is unknown.
pub fn items_of(conn: &Connection, ids: &[i64]) -> Result<Vec<i64>, DbError> {
    let mut stmt = conn.prepare_cached("SELECT item_id FROM photos WHERE id = ?1")?;
    ids.iter()
        .map(|id| {
            stmt.query_row(params![id], |r| r.get(0))
                .optional()?
                .ok_or_else(|| DbError::Invalid(format!("photo {id} not found")))
        })
        .collect()
}

pub fn delete(conn: &Connection, ids: &[i64]) -> Result<(), DbError> {
    let now = timestamp();
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO trash (id, deleted) VALUES (?1, ?2)")?;
    for id in ids {
        stmt.execute(params![id, now])?;
    }
    Ok(())
}

pub fn restore(conn: &Connection, ids: &[i64]) -> Result<(), DbError> {
    if !ids.is_empty() {
        let sql = format!("DELETE FROM trash WHERE id IN ({})", placeholders(ids.len()));
        conn.execute(&sql, params_from_iter(id_params(ids)))?;
    }
    Ok(())
}

/// Photos of `item` created after subject `floor` whose checksum is one of `checksums`.
pub fn created_since(
    conn: &Connection,
    item: i64,
    floor: i64,
    checksums: &[String],
) -> Result<Vec<i64>, DbError> {
    if checksums.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id FROM photos WHERE item_id = ? AND id > ? AND checksum IN ({}) ORDER BY id",
        placeholders(checksums.len())
    );
    let mut values: Vec<&dyn ToSql> = vec![&item, &floor];
    values.extend(checksums.iter().map(|c| c as &dyn ToSql));
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params_from_iter(values), |r| r.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Remove photos for good, together with their notes and trash rows.
pub fn purge(conn: &Connection, ids: &[i64]) -> Result<(), DbError> {
    if !ids.is_empty() {
        let sql = format!("DELETE FROM subjects WHERE id IN ({})", placeholders(ids.len()));
        conn.execute(&sql, params_from_iter(id_params(ids)))?;
    }
    Ok(())
}

/// Reassign photos to `item`.
pub fn move_to(conn: &Connection, ids: &[i64], item: i64) -> Result<(), DbError> {
    let mut stmt = conn.prepare("UPDATE photos SET item_id = ?1 WHERE id = ?2")?;
    for id in ids {
        stmt.execute(params![item, id])?;
    }
    Ok(())
}

pub fn save(conn: &Connection, id: i64, fields: &PhotoFields) -> Result<(), DbError> {
    if let Some(title) = &fields.title {
        let value = title.clone().into_option();
        conn.execute("UPDATE photos SET title = ?1 WHERE id = ?2", params![value, id])?;
    }
    if let Some(date) = &fields.date {
        let value = date.clone().into_option();
        conn.execute("UPDATE photos SET date = ?1 WHERE id = ?2", params![value, id])?;
    }
    conn.execute(
        "UPDATE subjects SET modified = ?1 WHERE id = ?2",
        params![timestamp(), id],
    )?;
    Ok(())
}

/// Rotate clockwise by `by` degrees. Returns the stored rotation.
pub fn rotate(conn: &Connection, id: i64, by: i32) -> Result<i32, DbError> {
    let current: i32 = conn
        .query_row("SELECT rotation FROM photos WHERE id = ?1", params![id], |r| {
            r.get(0)
        })
        .optional()?
        .ok_or_else(|| DbError::Invalid(format!("photo {id} not found")))?;
    let rotation = (current + by).rem_euclid(360);
    conn.execute(
        "UPDATE photos SET rotation = ?1 WHERE id = ?2",
        params![rotation, id],
    )?;
    Ok(rotation)
}

/// Record the outcome of verifying a photo's source file.
pub fn consolidate(
    conn: &Connection,
    id: i64,
    image: Option<&ImageInfo>,
    broken: bool,
) -> Result<i64, DbError> {
    let now = timestamp();
    match image {
        Some(image) => conn.execute(
            "UPDATE photos SET path = ?1, checksum = ?2, size = ?3, mimetype = ?4,
                    broken = ?5, consolidated = ?6
              WHERE id = ?7",
            params![
                image.path.to_string_lossy().into_owned(),
                image.checksum,
                i64::try_from(image.size).unwrap_or(i64::MAX),
                image.mimetype,
                broken,
                now,
                id
            ],
        )?,
        None => conn.execute(
            "UPDATE photos SET broken = ?1, consolidated = ?2 WHERE id = ?3",
            params![broken, now, id],
        )?,
    };
    Ok(now)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn image(n: u8) -> ImageInfo {
        ImageInfo {
            path: PathBuf::from(format!("/photos/{n}.jpg")),
            checksum: format!("sum{n}"),
            size: 10,
            mimetype: "image/jpeg",
        }
    }

    async fn with_photos(n: u8) -> (tempfile::TempDir, Database, i64, Vec<i64>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(&dir.path().join("p.folio")).await.unwrap();
        db.migrate().await.unwrap();
        let (item, ids) = db
            .transaction(move |tx| {
                let item = super::super::item::create(tx)?;
                let mut ids = Vec::new();
                for i in 0..n {
                    ids.push(create(tx, item.id, &image(i), usize::from(i))?.id);
                }
                Ok((item.id, ids))
            })
            .await
            .unwrap();
        (dir, db, item, ids)
    }

    #[tokio::test]
    async fn delete_hides_from_order_and_restore_brings_back() {
        let (_dir, db, item, ids) = with_photos(3).await;
        let middle = ids[1];
        db.call(move |c| delete(c, &[middle])).await.unwrap();
        assert_eq!(db.call(move |c| order(c, item)).await.unwrap(), vec![ids[0], ids[2]]);
        assert_eq!(db.call(move |c| checksums(c, item)).await.unwrap().len(), 2);

        db.call(move |c| restore(c, &[middle])).await.unwrap();
        let all = ids.clone();
        db.call(move |c| set_order(c, item, &all)).await.unwrap();
        assert_eq!(db.call(move |c| order(c, item)).await.unwrap(), ids);
    }

    #[tokio::test]
    async fn rotation_wraps_into_range() {
        let (_dir, db, _item, ids) = with_photos(1).await;
        let id = ids[0];
        assert_eq!(db.call(move |c| rotate(c, id, 270)).await.unwrap(), 270);
        assert_eq!(db.call(move |c| rotate(c, id, 180)).await.unwrap(), 90);
        assert_eq!(db.call(move |c| rotate(c, id, -180)).await.unwrap(), 270);
    }

    #[tokio::test]
    async fn save_only_touches_named_fields() {
        let (_dir, db, _item, ids) = with_photos(1).await;
        let fields = PhotoFields {
            title: Some(FieldUpdate::Set("Recto".into())),
            date: None,
        };
        let id = ids[0];
        db.call(move |c| save(c, id, &fields)).await.unwrap();
        let photo = db.call(move |c| get(c, id)).await.unwrap().unwrap();
        assert_eq!(photo.title.as_deref(), Some("Recto"));
        assert_eq!(photo.date, None);

        let previous = photo.fields_like(&PhotoFields {
            title: None,
            date: Some(FieldUpdate::Set("1900".into())),
        });
        assert_eq!(previous.date, Some(FieldUpdate::Clear));
        assert_eq!(previous.title, None);
    }
}
