use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use super::timestamp;
use crate::action::params::ProjectOpenedPayload;
use crate::error::DbError;

/// Where photo paths of a project are resolved from.
pub fn resolve_base(base: Option<&str>, project_file: &Path) -> Option<PathBuf> {
    match base? {
        "project" => crate::paths::project_base(project_file),
        "home" => dirs::home_dir(),
        "documents" => dirs::document_dir(),
        "pictures" => dirs::picture_dir(),
        "" => None,
        other => Some(PathBuf::from(other)),
    }
}

/// Insert the project row of a freshly migrated database. Returns the new id.
pub fn create(conn: &Connection, name: &str, base: Option<&str>) -> Result<String, DbError> {
    let id = uuid::Uuid::new_v4().to_string();
    tracing::info!(%id, "creating project \"{name}\"");
    conn.execute(
        "INSERT INTO project (project_id, name, base, created) VALUES (?1, ?2, ?3, ?4)",
        params![id, name, base, timestamp()],
    )?;
    Ok(id)
}

/// Summary metadata announced when the project opens.
pub fn load(conn: &Connection, file: &Path) -> Result<ProjectOpenedPayload, DbError> {
    let row: Option<(String, String, Option<String>)> = conn
        .query_row(
            "SELECT project_id, name, base FROM project LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let (id, name, base) = row.ok_or_else(|| DbError::NoProject(file.display().to_string()))?;

    let items: i64 = conn.query_row(
        "SELECT count(id) FROM items LEFT OUTER JOIN trash USING (id) WHERE deleted IS NULL",
        [],
        |r| r.get(0),
    )?;

    Ok(ProjectOpenedPayload {
        id,
        name,
        file: file.to_path_buf(),
        base: resolve_base(base.as_deref(), file),
        items: u64::try_from(items).unwrap_or(0),
    })
}

/// Whether `conn` holds a project row. Only reads, so it is safe to run
/// against files that were never folio projects.
pub fn exists(conn: &Connection) -> Result<bool, DbError> {
    let has_table: bool = conn.query_row(
        "SELECT count(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'project'",
        [],
        |r| r.get(0),
    )?;
    if !has_table {
        return Ok(false);
    }
    Ok(conn.query_row("SELECT count(*) > 0 FROM project", [], |r| r.get(0))?)
}

pub fn name(conn: &Connection, id: &str) -> Result<String, DbError> {
    conn.query_row(
        "SELECT name FROM project WHERE project_id = ?1",
        params![id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| DbError::NoProject(id.to_string()))
}

pub fn rename(conn: &Connection, id: &str, name: &str) -> Result<(), DbError> {
    if name.trim().is_empty() {
        return Err(DbError::Invalid("project name must not be empty".into()));
    }
    let changed = conn.execute(
        "UPDATE project SET name = ?1 WHERE project_id = ?2",
        params![name, id],
    )?;
    if changed == 0 {
        return Err(DbError::NoProject(id.to_string()));
    }
    Ok(())
}
