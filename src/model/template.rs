//! Metadata templates: a named, ordered list of property fields.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::timestamp;
use crate::action::params::{FieldUpdate, TemplateFields};
use crate::error::DbError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct Field {
    /// Assigned by storage. Kept when a removed field or template comes back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub property: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default, alias = "isRequired")]
    pub required: bool,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, alias = "isConstant")]
    pub constant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct Template {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub protected: bool,
    /// In display order.
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Template {
    /// Current values of the properties named in `data`, as an update that restores them.
    pub fn fields_like(&self, data: &TemplateFields) -> TemplateFields {
        TemplateFields {
            name: data.name.as_ref().map(|_| self.name.clone()),
            kind: data.kind.as_ref().map(|_| self.kind.clone()),
            creator: data
                .creator
                .as_ref()
                .map(|_| FieldUpdate::from_option(self.creator.clone())),
            description: data
                .description
                .as_ref()
                .map(|_| FieldUpdate::from_option(self.description.clone())),
        }
    }

    pub fn field_ids(&self) -> Vec<i64> {
        self.fields.iter().filter_map(|f| f.id).collect()
    }
}

/// On-disk template document.
#[derive(Debug, Clone, Deserialize)]
struct TemplateDoc {
    #[serde(rename = "@id", alias = "id")]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    name: String,
    #[serde(default)]
    creator: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "fields")]
    field: Vec<Field>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TemplateFile {
    Many(Vec<TemplateDoc>),
    One(TemplateDoc),
}

/// Parse a template file holding one template or a list of them.
pub fn parse(text: &str, protected: bool) -> Result<Vec<Template>, serde_json::Error> {
    let docs = match serde_json::from_str::<TemplateFile>(text)? {
        TemplateFile::Many(docs) => docs,
        TemplateFile::One(doc) => vec![doc],
    };
    Ok(docs
        .into_iter()
        .map(|doc| Template {
            id: doc.id,
            kind: doc.kind,
            name: doc.name,
            creator: doc.creator,
            description: doc.description,
            protected,
            fields: doc
                .field
                .into_iter()
                .map(|f| Field { id: None, ..f })
                .collect(),
        })
        .collect())
}

pub fn read_file(path: &Path, protected: bool) -> Result<Vec<Template>, DbError> {
    let text = std::fs::read_to_string(path)?;
    parse(&text, protected).map_err(|e| DbError::Invalid(format!("{}: {e}", path.display())))
}

/// Insert a template with its fields. Fails if the id is already taken.
pub fn create(conn: &Connection, template: &Template) -> Result<(), DbError> {
    for (what, value) in [
        ("id", &template.id),
        ("name", &template.name),
        ("type", &template.kind),
    ] {
        if value.trim().is_empty() {
            return Err(DbError::Invalid(format!("template {what} must not be empty")));
        }
    }
    let now = timestamp();
    conn.execute(
        "INSERT INTO templates
           (template_id, template_type, name, creator, description, protected, created, modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            template.id,
            template.kind,
            template.name,
            template.creator,
            template.description,
            template.protected,
            now
        ],
    )?;
    for (position, field) in template.fields.iter().enumerate() {
        insert_field(conn, &template.id, field, position)?;
    }
    Ok(())
}

fn insert_field(conn: &Connection, template: &str, field: &Field, position: usize) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO fields
           (field_id, template_id, property, label, datatype, is_required, hint, value,
            is_constant, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            field.id,
            template,
            field.property,
            field.label,
            field.datatype,
            field.required,
            field.hint,
            field.value,
            field.constant,
            i64::try_from(position).unwrap_or(i64::MAX),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn field_from_row(r: &Row<'_>) -> rusqlite::Result<Field> {
    Ok(Field {
        id: Some(r.get(0)?),
        property: r.get(1)?,
        label: r.get(2)?,
        datatype: r.get(3)?,
        required: r.get(4)?,
        hint: r.get(5)?,
        value: r.get(6)?,
        constant: r.get(7)?,
    })
}

pub fn fields(conn: &Connection, template: &str) -> Result<Vec<Field>, DbError> {
    let mut stmt = conn.prepare_cached(
        "SELECT field_id, property, label, datatype, is_required, hint, value, is_constant
           FROM fields WHERE template_id = ?1 ORDER BY position, field_id",
    )?;
    let fields = stmt
        .query_map(params![template], field_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(fields)
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Template>, DbError> {
    let row = conn
        .query_row(
            "SELECT template_id, template_type, name, creator, description, protected
               FROM templates WHERE template_id = ?1",
            params![id],
            |r| {
                Ok(Template {
                    id: r.get(0)?,
                    kind: r.get(1)?,
                    name: r.get(2)?,
                    creator: r.get(3)?,
                    description: r.get(4)?,
                    protected: r.get(5)?,
                    fields: Vec::new(),
                })
            },
        )
        .optional()?;
    let Some(mut template) = row else {
        return Ok(None);
    };
    template.fields = fields(conn, id)?;
    Ok(Some(template))
}

/// Every template when `ids` is empty, otherwise those of `ids` that exist.
pub fn load(conn: &Connection, ids: &[String]) -> Result<Vec<Template>, DbError> {
    let ids = if ids.is_empty() {
        let mut stmt = conn.prepare("SELECT template_id FROM templates ORDER BY name, template_id")?;
        let all = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        all
    } else {
        ids.to_vec()
    };
    let mut templates = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(template) = get(conn, id)? {
            templates.push(template);
        }
    }
    Ok(templates)
}

/// The template `id`, refusing protected ones.
pub fn editable(conn: &Connection, id: &str) -> Result<Template, DbError> {
    let template = get(conn, id)?.ok_or_else(|| DbError::Invalid(format!("template {id} not found")))?;
    if template.protected {
        return Err(DbError::Invalid(format!("template {id} is protected")));
    }
    Ok(template)
}

pub fn save(conn: &Connection, id: &str, data: &TemplateFields) -> Result<(), DbError> {
    if let Some(name) = &data.name {
        if name.trim().is_empty() {
            return Err(DbError::Invalid("template name must not be empty".into()));
        }
        conn.execute("UPDATE templates SET name = ?1 WHERE template_id = ?2", params![name, id])?;
    }
    if let Some(kind) = &data.kind {
        conn.execute(
            "UPDATE templates SET template_type = ?1 WHERE template_id = ?2",
            params![kind, id],
        )?;
    }
    if let Some(creator) = &data.creator {
        conn.execute(
            "UPDATE templates SET creator = ?1 WHERE template_id = ?2",
            params![creator.clone().into_option(), id],
        )?;
    }
    if let Some(description) = &data.description {
        conn.execute(
            "UPDATE templates SET description = ?1 WHERE template_id = ?2",
            params![description.clone().into_option(), id],
        )?;
    }
    conn.execute(
        "UPDATE templates SET modified = ?1 WHERE template_id = ?2",
        params![timestamp(), id],
    )?;
    Ok(())
}

/// Remove templates and their fields.
pub fn delete(conn: &Connection, ids: &[String]) -> Result<(), DbError> {
    let mut stmt = conn.prepare("DELETE FROM templates WHERE template_id = ?1")?;
    for id in ids {
        stmt.execute(params![id])?;
    }
    Ok(())
}

/// Store `ids` as the complete field order of `template`.
pub fn set_field_order(conn: &Connection, template: &str, ids: &[i64]) -> Result<(), DbError> {
    let mut stmt =
        conn.prepare_cached("UPDATE fields SET position = ?1 WHERE field_id = ?2 AND template_id = ?3")?;
    for (position, id) in ids.iter().enumerate() {
        stmt.execute(params![i64::try_from(position).unwrap_or(i64::MAX), id, template])?;
    }
    Ok(())
}

/// Insert `field` at `idx` (appended when absent). Returns the stored field.
pub fn add_field(
    conn: &Connection,
    template: &str,
    field: &Field,
    idx: Option<usize>,
) -> Result<Field, DbError> {
    let mut order: Vec<i64> = fields(conn, template)?.iter().filter_map(|f| f.id).collect();
    let id = insert_field(conn, template, field, order.len())?;
    let at = idx.unwrap_or(order.len()).min(order.len());
    order.insert(at, id);
    set_field_order(conn, template, &order)?;
    Ok(Field {
        id: Some(id),
        ..field.clone()
    })
}

/// Remove one field. Returns it with the position it held.
pub fn remove_field(conn: &Connection, template: &str, id: i64) -> Result<(Field, usize), DbError> {
    let mut current = fields(conn, template)?;
    let idx = current
        .iter()
        .position(|f| f.id == Some(id))
        .ok_or_else(|| DbError::Invalid(format!("field {id} is not in template {template}")))?;
    let field = current.remove(idx);
    conn.execute("DELETE FROM fields WHERE field_id = ?1", params![id])?;
    let order: Vec<i64> = current.iter().filter_map(|f| f.id).collect();
    set_field_order(conn, template, &order)?;
    Ok((field, idx))
}
