use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ActionType;
use crate::model::template::Field;

/// Represents a field update that distinguishes "absent" from "null" from "value".
/// Use as `Option<FieldUpdate<T>>` with `#[serde(default, deserialize_with = "field_update_opt::deserialize")]`.
///
/// - `None` (field absent via `#[serde(default)]`) → skip / unchanged
/// - `Some(FieldUpdate::Clear)` (JSON `null`) → clear the field
/// - `Some(FieldUpdate::Set(v))` (JSON value) → set the field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldUpdate<T> {
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Clear, Self::Set)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Clear => None,
            Self::Set(v) => Some(v),
        }
    }
}

/// Serde helper for `Option<FieldUpdate<T>>` fields.
/// Keeps JSON `null` as `Some(FieldUpdate::Clear)` instead of letting `Option` swallow it.
pub mod field_update_opt {
    use super::FieldUpdate;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<FieldUpdate<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        FieldUpdate::<T>::deserialize(deserializer).map(Some)
    }
}

// ── Project ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectOpenPayload {
    pub file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectOpenedPayload {
    pub id: String,
    pub name: String,
    pub file: PathBuf,
    pub base: Option<PathBuf>,
    /// Number of items not in the trash.
    pub items: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectRename {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListCreatePayload {
    pub name: String,
    /// Parent list; the root list when absent.
    #[serde(default)]
    pub parent: Option<i64>,
}

// ── Items ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemIds {
    pub items: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemPhotos {
    pub id: i64,
    pub photos: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemPhotosAdd {
    pub id: i64,
    pub photos: Vec<i64>,
    /// Insertion index; appended when absent.
    #[serde(default)]
    pub idx: Option<usize>,
}

// ── Photos ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PhotoCreatePayload {
    pub item: i64,
    /// Files to import. Prompts interactively when absent.
    #[serde(default)]
    pub files: Option<Vec<PathBuf>>,
    /// Insertion index within the item; appended when absent.
    #[serde(default)]
    pub idx: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PhotosOfItem {
    pub item: i64,
    pub photos: Vec<i64>,
}

/// Restores trashed photos. `idx[i]` is the ordinal position `photos[i]`
/// held before it was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PhotoRestorePayload {
    pub item: i64,
    pub photos: Vec<i64>,
    pub idx: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PhotoMovePayload {
    /// Target item.
    pub item: i64,
    /// Photos to move; all must belong to the same source item.
    pub photos: Vec<i64>,
    /// Insertion index in the target; appended when absent.
    #[serde(default)]
    pub idx: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PhotoFields {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "field_update_opt::deserialize"
    )]
    pub title: Option<FieldUpdate<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "field_update_opt::deserialize"
    )]
    pub date: Option<FieldUpdate<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PhotoSavePayload {
    pub id: i64,
    pub data: PhotoFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PhotoRotatePayload {
    pub id: i64,
    /// Degrees, clockwise. Normalized into `0..360` when stored.
    pub by: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PhotoConsolidatePayload {
    /// Photos to verify; every photo in the project when empty.
    #[serde(default)]
    pub photos: Vec<i64>,
    /// Re-derive and store checksums even when unchanged.
    #[serde(default)]
    pub force: bool,
    /// Ask the user to relocate photos whose file is missing.
    #[serde(default)]
    pub prompt: bool,
}

/// Partial in-memory photo update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PhotoPatch {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, flatten)]
    pub fields: PhotoFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidated: Option<u64>,
}

impl PhotoPatch {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

// ── Notes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NoteCreatePayload {
    pub photo: i64,
    pub text: String,
    /// Opaque rich-text document body.
    #[serde(default)]
    pub state: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NoteSavePayload {
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub state: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NotesOfPhoto {
    pub photo: i64,
    pub notes: Vec<i64>,
}

// ── Vocabularies ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VocabImportPayload {
    /// Vocabulary files to import. Prompts interactively when absent.
    #[serde(default)]
    pub files: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub protected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VocabSavePayload {
    pub id: String,
    pub title: String,
}

// ── Templates ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateImportPayload {
    /// Template files to import. Prompts interactively when absent.
    #[serde(default)]
    pub files: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub protected: bool,
}

/// Template properties to change. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "field_update_opt::deserialize"
    )]
    pub creator: Option<FieldUpdate<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "field_update_opt::deserialize"
    )]
    pub description: Option<FieldUpdate<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateSavePayload {
    pub id: String,
    pub data: TemplateFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateFieldAddPayload {
    pub id: String,
    pub field: Field,
    /// Position among the template's fields; appended when absent.
    #[serde(default)]
    pub idx: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateFieldRemovePayload {
    pub id: String,
    pub field: i64,
}

/// The complete field order of one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateFieldOrderPayload {
    pub id: String,
    pub fields: Vec<i64>,
}

// ── Activity ────────────────────────────────────────────────────

/// Emitted once per completed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActivityDone {
    pub seq: Option<u64>,
    pub kind: ActionType,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub cancelled: bool,
}
