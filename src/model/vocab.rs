use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::timestamp;
use crate::error::DbError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Vocab {
    pub id: String,
    pub prefix: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub protected: bool,
    pub terms: usize,
    pub deleted: bool,
}

/// One term of a vocabulary file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermData {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabData {
    pub id: String,
    #[serde(default)]
    pub prefix: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub terms: Vec<TermData>,
}

/// A vocabulary file holds one vocabulary or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum VocabFile {
    Many(Vec<VocabData>),
    One(VocabData),
}

pub fn parse(text: &str) -> Result<Vec<VocabData>, serde_json::Error> {
    Ok(match serde_json::from_str::<VocabFile>(text)? {
        VocabFile::Many(v) => v,
        VocabFile::One(v) => vec![v],
    })
}

pub fn read_file(path: &Path) -> Result<Vec<VocabData>, DbError> {
    let text = std::fs::read_to_string(path)?;
    parse(&text).map_err(|e| DbError::Invalid(format!("{}: {e}", path.display())))
}

/// Insert a vocabulary with its terms. Fails if the id is already present.
pub fn create(conn: &Connection, data: &VocabData, protected: bool) -> Result<(), DbError> {
    if data.id.trim().is_empty() {
        return Err(DbError::Invalid("vocabulary id must not be empty".into()));
    }
    conn.execute(
        "INSERT INTO vocabularies (vocab_id, prefix, title, description, protected)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![data.id, data.prefix, data.title, data.description, protected],
    )?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO terms (term_id, vocab_id, label, comment) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for term in &data.terms {
        stmt.execute(params![term.id, data.id, term.label, term.comment])?;
    }
    Ok(())
}

const SELECT: &str = "SELECT vocab_id, prefix, title, description, protected,
        (SELECT count(*) FROM terms t WHERE t.vocab_id = v.vocab_id),
        deleted IS NOT NULL
   FROM vocabularies v";

fn from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Vocab> {
    let terms: i64 = r.get(5)?;
    Ok(Vocab {
        id: r.get(0)?,
        prefix: r.get(1)?,
        title: r.get(2)?,
        description: r.get(3)?,
        protected: r.get(4)?,
        terms: usize::try_from(terms).unwrap_or(0),
        deleted: r.get(6)?,
    })
}

/// Live vocabularies; when `ids` is non-empty only those (live or not).
pub fn load(conn: &Connection, ids: &[String]) -> Result<Vec<Vocab>, DbError> {
    if ids.is_empty() {
        let mut stmt = conn.prepare(&format!("{SELECT} WHERE deleted IS NULL ORDER BY vocab_id"))?;
        let vocabs = stmt
            .query_map([], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(vocabs);
    }
    let mut stmt = conn.prepare_cached(&format!("{SELECT} WHERE vocab_id = ?1"))?;
    let mut vocabs = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(v) = stmt.query_row(params![id], from_row).optional()? {
            vocabs.push(v);
        }
    }
    Ok(vocabs)
}

pub fn delete(conn: &Connection, ids: &[String]) -> Result<(), DbError> {
    let mut stmt = conn.prepare("UPDATE vocabularies SET deleted = ?1 WHERE vocab_id = ?2")?;
    let now = timestamp();
    for id in ids {
        stmt.execute(params![now, id])?;
    }
    Ok(())
}

pub fn restore(conn: &Connection, ids: &[String]) -> Result<(), DbError> {
    let mut stmt = conn.prepare("UPDATE vocabularies SET deleted = NULL WHERE vocab_id = ?1")?;
    for id in ids {
        stmt.execute(params![id])?;
    }
    Ok(())
}

/// Remove vocabularies and their terms for good.
pub fn purge(conn: &Connection, ids: &[String]) -> Result<(), DbError> {
    let mut stmt = conn.prepare("DELETE FROM vocabularies WHERE vocab_id = ?1")?;
    for id in ids {
        stmt.execute(params![id])?;
    }
    Ok(())
}

pub fn title(conn: &Connection, id: &str) -> Result<String, DbError> {
    conn.query_row(
        "SELECT title FROM vocabularies WHERE vocab_id = ?1",
        params![id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| DbError::Invalid(format!("vocabulary {id} not found")))
}

pub fn save(conn: &Connection, id: &str, title: &str) -> Result<(), DbError> {
    let changed = conn.execute(
        "UPDATE vocabularies SET title = ?1 WHERE vocab_id = ?2",
        params![title, id],
    )?;
    if changed == 0 {
        return Err(DbError::Invalid(format!("vocabulary {id} not found")));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::db::Database;

    const DC: &str = r#"{
        "id": "http://purl.org/dc/terms/",
        "prefix": "dcterms",
        "title": "DCMI Metadata Terms",
        "terms": [{ "id": "http://purl.org/dc/terms/title", "label": "Title" }]
    }"#;

    #[test]
    fn parse_accepts_one_or_many() {
        assert_eq!(parse(DC).unwrap().len(), 1);
        let many = format!("[{DC}, {}]", DC.replace("dc/terms/\"", "dc/elements/\""));
        assert_eq!(parse(&many).unwrap().len(), 2);
        assert!(parse("{ \"title\": 1 }").is_err());
    }

    #[tokio::test]
    async fn duplicate_import_fails_and_delete_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(&dir.path().join("p.folio")).await.unwrap();
        db.migrate().await.unwrap();
        let data = parse(DC).unwrap().remove(0);

        let first = data.clone();
        db.call(move |c| create(c, &first, false)).await.unwrap();
        let again = data.clone();
        assert!(db.call(move |c| create(c, &again, false)).await.is_err());

        let loaded = db.call(|c| load(c, &[])).await.unwrap();
        assert_eq!(loaded[0].terms, 1);

        let ids = vec![data.id.clone()];
        let deleting = ids.clone();
        db.call(move |c| delete(c, &deleting)).await.unwrap();
        assert!(db.call(|c| load(c, &[])).await.unwrap().is_empty());
        let loading = ids.clone();
        assert!(db.call(move |c| load(c, &loading)).await.unwrap()[0].deleted);
        db.call(move |c| restore(c, &ids)).await.unwrap();
        assert_eq!(db.call(|c| load(c, &[])).await.unwrap().len(), 1);
    }
}
