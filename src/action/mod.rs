//! Inert intent records flowing through the dispatch pipeline.
//!
//! An [`Action`] is produced by UI or orchestration code and is never mutated
//! after dispatch; the store shares dispatched actions as `Arc<Action>`.
//! The creator modules at the bottom of this file mirror the action
//! creators of the UI layer and carry each action's default metadata.

pub mod params;

use std::fmt;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::CommandError;

// ── Action type ─────────────────────────────────────────────────

macro_rules! action_types {
    ( $( $variant:ident => $name:literal $(, $flag:ident)* ; )* ) => {
        /// Closed set of action types. The serialized form is the dotted name
        /// used by the UI (`"photo.create"`).
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, TS, JsonSchema,
        )]
        #[ts(export)]
        pub enum ActionType {
            $( #[serde(rename = $name)] $variant, )*
        }

        impl ActionType {
            pub const ALL: &'static [ActionType] = &[ $( ActionType::$variant, )* ];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( ActionType::$variant => $name, )*
                }
            }

            /// Whether this type is executed by a registered command.
            pub fn is_command(self) -> bool {
                match self {
                    $( ActionType::$variant => action_types!(@has command; $($flag)*), )*
                }
            }

            /// Whether the retrieval listener reacts to this type.
            pub fn is_retrievable(self) -> bool {
                match self {
                    $( ActionType::$variant => action_types!(@has retrieve; $($flag)*), )*
                }
            }

            /// Whether the persistence listener reacts to this type.
            pub fn is_persistable(self) -> bool {
                match self {
                    $( ActionType::$variant => action_types!(@has persist; $($flag)*), )*
                }
            }
        }
    };

    (@has command; command $($rest:ident)*) => { true };
    (@has retrieve; retrieve $($rest:ident)*) => { true };
    (@has persist; persist $($rest:ident)*) => { true };
    (@has $want:ident; $_other:ident $($rest:ident)*) => { action_types!(@has $want; $($rest)*) };
    (@has $want:ident;) => { false };
}

action_types! {
    ProjectOpen => "project.open";
    ProjectOpened => "project.opened";
    ProjectClose => "project.close";
    ProjectClosed => "project.closed";
    ProjectPersist => "project.persist", persist;
    ProjectUpdate => "project.update";
    ProjectReload => "project.reload", retrieve;

    HistoryTick => "history.tick";
    HistoryUndo => "history.undo";
    HistoryRedo => "history.redo";
    HistoryDrop => "history.drop";
    HistoryUpdate => "history.update";

    NavRestore => "nav.restore";
    NavUpdate => "nav.update";

    ListLoad => "list.load", retrieve;
    ListInsert => "list.insert";
    ListCreate => "list.create", persist;
    ListDelete => "list.delete", persist;
    ListRemove => "list.remove";

    ItemCreate => "item.create", command;
    ItemDelete => "item.delete", command;
    ItemRestore => "item.restore", command;
    ItemInsert => "item.insert";
    ItemRemove => "item.remove";
    ItemUpdate => "item.update";
    ItemPhotosAdd => "item.photos.add";
    ItemPhotosRemove => "item.photos.remove";

    PhotoCreate => "photo.create", command;
    PhotoDelete => "photo.delete", command;
    PhotoRestore => "photo.restore", command;
    PhotoMove => "photo.move", command;
    PhotoOrder => "photo.order", command;
    PhotoSave => "photo.save", command;
    PhotoRotate => "photo.rotate", command;
    PhotoConsolidate => "photo.consolidate", command;
    PhotoDuplicate => "photo.duplicate", command;
    PhotoLoad => "photo.load", command;
    PhotoInsert => "photo.insert";
    PhotoRemove => "photo.remove";
    PhotoUpdate => "photo.update";
    PhotoBulkUpdate => "photo.bulk.update";

    NoteCreate => "note.create", command;
    NoteSave => "note.save", command;
    NoteDelete => "note.delete", command;
    NoteRestore => "note.restore", command;
    NoteLoad => "note.load", command;
    NoteInsert => "note.insert";
    NoteUpdate => "note.update";
    NoteRemove => "note.remove";

    VocabImport => "vocab.import", command;
    VocabDelete => "vocab.delete", command;
    VocabRestore => "vocab.restore", command;
    VocabSave => "vocab.save", command;
    VocabLoad => "vocab.load", command;
    VocabInsert => "vocab.insert";
    VocabUpdate => "vocab.update";
    VocabRemove => "vocab.remove";

    TemplateImport => "template.import", command;
    TemplateCreate => "template.create", command;
    TemplateSave => "template.save", command;
    TemplateDelete => "template.delete", command;
    TemplateFieldAdd => "template.field.add", command;
    TemplateFieldRemove => "template.field.remove", command;
    TemplateFieldOrder => "template.field.order", command;
    TemplateLoad => "template.load", command;
    TemplateInsert => "template.insert";
    TemplateRemove => "template.remove";

    ActivityUpdate => "activity.update";
    ActivityDone => "activity.done";
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Meta ────────────────────────────────────────────────────────

/// How a reversible command's outcome enters the history stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// Append a new entry, advancing the cursor.
    #[default]
    Tick,
    /// Coalesce into the entry below the cursor.
    Merge,
}

/// The recognized action options. Nothing else rides along in `meta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct ActionMeta {
    /// May run off the synchronous dispatch path.
    #[serde(rename = "async", default)]
    pub is_async: bool,
    /// Track the effect as a visible activity.
    #[serde(default)]
    pub record: bool,
    /// Requested history policy. `None` means never offered to history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryMode>,
    /// Mirror to other processes.
    #[serde(default)]
    pub ipc: bool,
    /// Dispatch timestamp in milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<u64>,
    /// Dispatch sequence id; the identity of the command bound to this action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl ActionMeta {
    /// Mutation defaults: async, recorded, one history tick.
    pub fn mutation() -> Self {
        Self {
            is_async: true,
            record: true,
            history: Some(HistoryMode::Tick),
            ..Self::default()
        }
    }

    /// Defaults for inverse actions: async and recorded, never re-entering history.
    pub fn inverse() -> Self {
        Self {
            is_async: true,
            record: true,
            ..Self::default()
        }
    }

    pub fn asynchronous() -> Self {
        Self {
            is_async: true,
            ..Self::default()
        }
    }

    pub fn ipc() -> Self {
        Self {
            ipc: true,
            ..Self::default()
        }
    }

    pub fn with_history(mut self, mode: Option<HistoryMode>) -> Self {
        self.history = mode;
        self
    }
}

// ── Action ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default)]
    #[ts(type = "unknown")]
    pub payload: Value,
    #[serde(default)]
    pub meta: ActionMeta,
    #[serde(default)]
    pub error: bool,
}

impl Action {
    pub fn new(kind: ActionType, payload: impl Serialize) -> Self {
        Self {
            kind,
            payload: serde_json::to_value(payload).unwrap_or_default(),
            meta: ActionMeta::default(),
            error: false,
        }
    }

    pub fn with_meta(mut self, meta: ActionMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn seq(&self) -> Option<u64> {
        self.meta.seq
    }

    /// Decode the payload into the typed shape this action carries.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, CommandError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| CommandError::Payload {
            kind: self.kind,
            message: e.to_string(),
        })
    }

    /// A copy suitable for replay by undo/redo: it never records history
    /// again and receives a fresh sequence id on dispatch.
    pub fn for_replay(&self) -> Self {
        let mut action = self.clone();
        action.meta.history = None;
        action.meta.seq = None;
        action.meta.now = None;
        action
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.meta.seq {
            Some(seq) => write!(f, "{}#{seq}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

// ── Creators ────────────────────────────────────────────────────

pub mod project {
    use super::params::{ProjectOpenedPayload, ProjectRename};
    use super::{Action, ActionMeta, ActionType};
    use std::path::Path;

    pub fn open(file: &Path) -> Action {
        Action::new(ActionType::ProjectOpen, serde_json::json!({ "file": file }))
    }

    pub fn opened(payload: &ProjectOpenedPayload) -> Action {
        Action::new(ActionType::ProjectOpened, payload).with_meta(ActionMeta::ipc())
    }

    pub fn close() -> Action {
        Action::new(ActionType::ProjectClose, serde_json::Value::Null)
    }

    pub fn closed(id: &str) -> Action {
        Action::new(ActionType::ProjectClosed, serde_json::json!({ "id": id }))
            .with_meta(ActionMeta::ipc())
    }

    /// Rename the project; handled by the persistence listener.
    pub fn persist(payload: &ProjectRename, history: bool) -> Action {
        let meta = if history {
            ActionMeta::mutation()
        } else {
            ActionMeta::inverse()
        };
        Action::new(ActionType::ProjectPersist, payload).with_meta(meta)
    }

    pub fn update(payload: &ProjectRename) -> Action {
        Action::new(ActionType::ProjectUpdate, payload).with_meta(ActionMeta::ipc())
    }

    pub fn reload() -> Action {
        Action::new(ActionType::ProjectReload, serde_json::Value::Null)
            .with_meta(ActionMeta::asynchronous())
    }
}

pub mod history {
    use super::{Action, ActionType};
    use crate::history::{HistoryEntry, UndoState};

    pub fn tick(entry: &HistoryEntry) -> Action {
        Action::new(ActionType::HistoryTick, entry)
    }

    pub fn undo() -> Action {
        Action::new(ActionType::HistoryUndo, serde_json::Value::Null)
    }

    pub fn redo() -> Action {
        Action::new(ActionType::HistoryRedo, serde_json::Value::Null)
    }

    pub fn drop() -> Action {
        Action::new(ActionType::HistoryDrop, serde_json::Value::Null)
    }

    pub fn update(state: &UndoState) -> Action {
        Action::new(ActionType::HistoryUpdate, state)
    }
}

pub mod nav {
    use super::{Action, ActionType};
    use crate::nav::NavState;

    pub fn restore(state: &NavState) -> Action {
        Action::new(ActionType::NavRestore, state)
    }

    pub fn update(state: &NavState) -> Action {
        Action::new(ActionType::NavUpdate, state)
    }
}

pub mod list {
    use super::params::ListCreatePayload;
    use super::{Action, ActionMeta, ActionType};
    use crate::model::list::ListEntry;

    pub fn load() -> Action {
        Action::new(ActionType::ListLoad, serde_json::Value::Null)
            .with_meta(ActionMeta::asynchronous())
    }

    pub fn insert(lists: &[ListEntry]) -> Action {
        Action::new(ActionType::ListInsert, lists)
    }

    pub fn create(payload: &ListCreatePayload) -> Action {
        Action::new(ActionType::ListCreate, payload).with_meta(ActionMeta::asynchronous())
    }

    pub fn delete(id: i64) -> Action {
        Action::new(ActionType::ListDelete, id).with_meta(ActionMeta::asynchronous())
    }

    pub fn remove(id: i64) -> Action {
        Action::new(ActionType::ListRemove, id)
    }
}

pub mod item {
    use super::params::{ItemIds, ItemPhotos, ItemPhotosAdd};
    use super::{Action, ActionMeta, ActionType};
    use crate::model::item::Item;

    pub fn create() -> Action {
        Action::new(ActionType::ItemCreate, serde_json::json!({}))
            .with_meta(ActionMeta::mutation())
    }

    pub fn delete(payload: &ItemIds) -> Action {
        Action::new(ActionType::ItemDelete, payload).with_meta(ActionMeta::mutation())
    }

    pub fn restore(payload: &ItemIds) -> Action {
        Action::new(ActionType::ItemRestore, payload).with_meta(ActionMeta::inverse())
    }

    pub fn insert(items: &[Item]) -> Action {
        Action::new(ActionType::ItemInsert, items)
    }

    pub fn remove(ids: &[i64]) -> Action {
        Action::new(ActionType::ItemRemove, ids)
    }

    pub fn update(payload: &ItemPhotos) -> Action {
        Action::new(ActionType::ItemUpdate, payload)
    }

    pub fn photos_add(payload: &ItemPhotosAdd) -> Action {
        Action::new(ActionType::ItemPhotosAdd, payload)
    }

    pub fn photos_remove(payload: &ItemPhotos) -> Action {
        Action::new(ActionType::ItemPhotosRemove, payload)
    }
}

pub mod photo {
    use super::params::{
        PhotoConsolidatePayload, PhotoCreatePayload, PhotoMovePayload, PhotoPatch, PhotoRestorePayload,
        PhotoRotatePayload, PhotoSavePayload, PhotosOfItem,
    };
    use super::{Action, ActionMeta, ActionType};
    use crate::model::photo::Photo;

    pub fn create(payload: &PhotoCreatePayload) -> Action {
        Action::new(ActionType::PhotoCreate, payload).with_meta(ActionMeta::mutation())
    }

    pub fn delete(payload: &PhotosOfItem) -> Action {
        Action::new(ActionType::PhotoDelete, payload).with_meta(ActionMeta::mutation())
    }

    pub fn restore(payload: &PhotoRestorePayload) -> Action {
        Action::new(ActionType::PhotoRestore, payload).with_meta(ActionMeta::inverse())
    }

    pub fn move_to(payload: &PhotoMovePayload) -> Action {
        Action::new(ActionType::PhotoMove, payload).with_meta(ActionMeta::mutation())
    }

    pub fn order(payload: &PhotosOfItem) -> Action {
        Action::new(ActionType::PhotoOrder, payload).with_meta(ActionMeta::mutation())
    }

    pub fn save(payload: &PhotoSavePayload) -> Action {
        Action::new(ActionType::PhotoSave, payload).with_meta(ActionMeta::mutation())
    }

    pub fn rotate(payload: &PhotoRotatePayload) -> Action {
        Action::new(ActionType::PhotoRotate, payload).with_meta(ActionMeta::mutation())
    }

    pub fn consolidate(payload: &PhotoConsolidatePayload) -> Action {
        Action::new(ActionType::PhotoConsolidate, payload).with_meta(ActionMeta::inverse())
    }

    pub fn load(ids: &[i64]) -> Action {
        Action::new(ActionType::PhotoLoad, ids).with_meta(ActionMeta::asynchronous())
    }

    pub fn duplicate(payload: &PhotosOfItem) -> Action {
        Action::new(ActionType::PhotoDuplicate, payload).with_meta(ActionMeta::mutation())
    }

    pub fn insert(photos: &[Photo]) -> Action {
        Action::new(ActionType::PhotoInsert, photos)
    }

    /// Drop photos from memory entirely, including item photo lists.
    pub fn remove(ids: &[i64]) -> Action {
        Action::new(ActionType::PhotoRemove, ids)
    }

    pub fn update(patch: &PhotoPatch) -> Action {
        Action::new(ActionType::PhotoUpdate, patch)
    }

    pub fn bulk_update(patches: &[PhotoPatch]) -> Action {
        Action::new(ActionType::PhotoBulkUpdate, patches)
    }
}

pub mod note {
    use super::params::{NoteCreatePayload, NoteSavePayload, NotesOfPhoto};
    use super::{Action, ActionMeta, ActionType, HistoryMode};
    use crate::model::note::Note;

    pub fn create(payload: &NoteCreatePayload) -> Action {
        Action::new(ActionType::NoteCreate, payload).with_meta(ActionMeta::mutation())
    }

    /// Text edits coalesce into one history entry while typing.
    pub fn save(payload: &NoteSavePayload, mode: HistoryMode) -> Action {
        Action::new(ActionType::NoteSave, payload)
            .with_meta(ActionMeta::mutation().with_history(Some(mode)))
    }

    pub fn delete(payload: &NotesOfPhoto) -> Action {
        Action::new(ActionType::NoteDelete, payload).with_meta(ActionMeta::mutation())
    }

    pub fn restore(payload: &NotesOfPhoto) -> Action {
        Action::new(ActionType::NoteRestore, payload).with_meta(ActionMeta::inverse())
    }

    pub fn load(ids: &[i64]) -> Action {
        Action::new(ActionType::NoteLoad, ids).with_meta(ActionMeta::asynchronous())
    }

    pub fn insert(notes: &[Note]) -> Action {
        Action::new(ActionType::NoteInsert, notes)
    }

    pub fn update(note: &Note) -> Action {
        Action::new(ActionType::NoteUpdate, note)
    }

    pub fn remove(ids: &[i64]) -> Action {
        Action::new(ActionType::NoteRemove, ids)
    }
}

pub mod vocab {
    use super::params::{VocabImportPayload, VocabSavePayload};
    use super::{Action, ActionMeta, ActionType};
    use crate::model::vocab::Vocab;

    pub fn import(payload: &VocabImportPayload) -> Action {
        Action::new(ActionType::VocabImport, payload).with_meta(ActionMeta::mutation())
    }

    pub fn delete(ids: &[String]) -> Action {
        Action::new(ActionType::VocabDelete, ids).with_meta(ActionMeta::mutation())
    }

    pub fn restore(ids: &[String]) -> Action {
        Action::new(ActionType::VocabRestore, ids).with_meta(ActionMeta::inverse())
    }

    pub fn save(payload: &VocabSavePayload) -> Action {
        Action::new(ActionType::VocabSave, payload).with_meta(ActionMeta::mutation())
    }

    pub fn load() -> Action {
        Action::new(ActionType::VocabLoad, serde_json::Value::Null)
            .with_meta(ActionMeta::asynchronous())
    }

    pub fn insert(vocabs: &[Vocab]) -> Action {
        Action::new(ActionType::VocabInsert, vocabs)
    }

    pub fn update(payload: &VocabSavePayload) -> Action {
        Action::new(ActionType::VocabUpdate, payload)
    }

    pub fn remove(ids: &[String]) -> Action {
        Action::new(ActionType::VocabRemove, ids)
    }
}

pub mod template {
    use super::params::{
        TemplateFieldAddPayload, TemplateFieldOrderPayload, TemplateFieldRemovePayload,
        TemplateImportPayload, TemplateSavePayload,
    };
    use super::{Action, ActionMeta, ActionType};
    use crate::model::template::Template;

    pub fn import(payload: &TemplateImportPayload) -> Action {
        Action::new(ActionType::TemplateImport, payload).with_meta(ActionMeta::mutation())
    }

    pub fn create(templates: &[Template]) -> Action {
        Action::new(ActionType::TemplateCreate, templates).with_meta(ActionMeta::mutation())
    }

    pub fn save(payload: &TemplateSavePayload) -> Action {
        Action::new(ActionType::TemplateSave, payload).with_meta(ActionMeta::mutation())
    }

    pub fn delete(ids: &[String]) -> Action {
        Action::new(ActionType::TemplateDelete, ids).with_meta(ActionMeta::mutation())
    }

    pub fn field_add(payload: &TemplateFieldAddPayload) -> Action {
        Action::new(ActionType::TemplateFieldAdd, payload).with_meta(ActionMeta::mutation())
    }

    pub fn field_remove(payload: &TemplateFieldRemovePayload) -> Action {
        Action::new(ActionType::TemplateFieldRemove, payload).with_meta(ActionMeta::mutation())
    }

    pub fn field_order(payload: &TemplateFieldOrderPayload) -> Action {
        Action::new(ActionType::TemplateFieldOrder, payload).with_meta(ActionMeta::mutation())
    }

    pub fn load() -> Action {
        Action::new(ActionType::TemplateLoad, serde_json::Value::Null)
            .with_meta(ActionMeta::asynchronous())
    }

    pub fn insert(templates: &[Template]) -> Action {
        Action::new(ActionType::TemplateInsert, templates)
    }

    pub fn remove(ids: &[String]) -> Action {
        Action::new(ActionType::TemplateRemove, ids)
    }
}

pub mod activity {
    use super::params::ActivityDone;
    use super::{Action, ActionType};
    use crate::progress::ProgressEvent;

    pub fn update(event: &ProgressEvent) -> Action {
        Action::new(ActionType::ActivityUpdate, event)
    }

    pub fn done(payload: &ActivityDone) -> Action {
        Action::new(ActionType::ActivityDone, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_serializes_as_dotted_name() {
        let json = serde_json::to_value(ActionType::PhotoBulkUpdate).unwrap_or_default();
        assert_eq!(json, serde_json::json!("photo.bulk.update"));
        for kind in ActionType::ALL {
            assert_eq!(
                crate::util::serde_variant_name(kind).as_deref(),
                Some(kind.as_str())
            );
        }
    }

    #[test]
    fn listener_roles_are_disjoint() {
        for kind in ActionType::ALL {
            let roles = [kind.is_command(), kind.is_retrievable(), kind.is_persistable()];
            assert!(roles.iter().filter(|r| **r).count() <= 1, "{kind} has several roles");
        }
    }

    #[test]
    fn meta_uses_recognized_keys_only() {
        let meta = ActionMeta::mutation();
        let json = serde_json::to_value(meta).unwrap_or_default();
        assert_eq!(
            json,
            serde_json::json!({ "async": true, "record": true, "history": "tick", "ipc": false })
        );
    }

    #[test]
    fn replay_clears_history_and_identity() {
        let mut action = photo::order(&params::PhotosOfItem { item: 1, photos: vec![3, 2] });
        action.meta.seq = Some(9);
        action.meta.now = Some(1);
        let replay = action.for_replay();
        assert_eq!(replay.meta.history, None);
        assert_eq!(replay.meta.seq, None);
        assert_eq!(replay.payload, action.payload);
        assert!(replay.meta.is_async);
    }

    #[test]
    fn payload_decode_error_names_action() {
        let action = Action::new(ActionType::PhotoOrder, serde_json::json!({ "item": "x" }));
        let err = action.payload_as::<params::PhotosOfItem>().err();
        assert!(matches!(err, Some(CommandError::Payload { kind: ActionType::PhotoOrder, .. })));
    }
}
