use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::action::params::{
    ActivityDone, ItemPhotos, ItemPhotosAdd, PhotoPatch, ProjectOpenedPayload, ProjectRename,
    VocabSavePayload,
};
use crate::action::{Action, ActionType};
use crate::history::UndoState;
use crate::model::item::Item;
use crate::model::list::ListEntry;
use crate::model::note::Note;
use crate::model::photo::Photo;
use crate::model::template::Template;
use crate::model::vocab::Vocab;
use crate::nav::NavState;
use crate::progress::ProgressEvent;

// ── Application State ──────────────────────────────────────────────

/// In-memory view of the open project, updated only by [`AppState::reduce`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppState {
    pub project: Option<ProjectOpenedPayload>,
    pub items: IndexMap<i64, Item>,
    pub photos: IndexMap<i64, Photo>,
    pub notes: IndexMap<i64, Note>,
    pub lists: IndexMap<i64, ListEntry>,
    pub vocabs: IndexMap<String, Vocab>,
    pub templates: IndexMap<String, Template>,
    pub nav: NavState,
    pub history: UndoState,
    /// Batch commands in progress, by sequence id.
    pub activities: IndexMap<u64, ProgressEvent>,
}

impl PhotoPatch {
    pub fn apply(&self, photo: &mut Photo) {
        if let Some(item) = self.item {
            photo.item = item;
        }
        if let Some(path) = &self.path {
            photo.path.clone_from(path);
        }
        if let Some(checksum) = &self.checksum {
            photo.checksum.clone_from(checksum);
        }
        if let Some(size) = self.size {
            photo.size = size;
        }
        if let Some(title) = &self.fields.title {
            photo.title = title.clone().into_option();
        }
        if let Some(date) = &self.fields.date {
            photo.date = date.clone().into_option();
        }
        if let Some(rotation) = self.rotation {
            photo.rotation = rotation;
        }
        if let Some(broken) = self.broken {
            photo.broken = broken;
        }
        if let Some(consolidated) = self.consolidated {
            photo.consolidated = Some(i64::try_from(consolidated).unwrap_or(i64::MAX));
        }
    }
}

fn decode<T: DeserializeOwned>(action: &Action) -> Option<T> {
    match action.payload_as::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(action = %action, "reducer ignored malformed payload: {e}");
            None
        }
    }
}

impl AppState {
    /// Apply a dispatched action. Unknown or malformed actions leave the state unchanged.
    pub fn reduce(&mut self, action: &Action) {
        match action.kind {
            ActionType::ProjectOpened => {
                if let Some(project) = decode::<ProjectOpenedPayload>(action) {
                    *self = AppState {
                        project: Some(project),
                        ..AppState::default()
                    };
                }
            }
            ActionType::ProjectClosed => *self = AppState::default(),
            ActionType::ProjectUpdate => {
                if let (Some(project), Some(rename)) =
                    (self.project.as_mut(), decode::<ProjectRename>(action))
                {
                    project.name = rename.name;
                }
            }

            ActionType::HistoryUpdate => {
                if let Some(state) = decode::<UndoState>(action) {
                    self.history = state;
                }
            }

            ActionType::NavRestore | ActionType::NavUpdate => {
                if let Some(nav) = decode::<NavState>(action) {
                    self.nav = nav;
                }
            }

            ActionType::ListInsert => {
                for list in decode::<Vec<ListEntry>>(action).unwrap_or_default() {
                    if let Some(parent) = list.parent.and_then(|p| self.lists.get_mut(&p)) {
                        if !parent.children.contains(&list.id) {
                            parent.children.push(list.id);
                        }
                    }
                    self.lists.insert(list.id, list);
                }
            }
            ActionType::ListRemove => {
                if let Some(id) = decode::<i64>(action) {
                    if let Some(list) = self.lists.shift_remove(&id) {
                        if let Some(parent) = list.parent.and_then(|p| self.lists.get_mut(&p)) {
                            parent.children.retain(|c| *c != id);
                        }
                    }
                }
            }

            ActionType::ItemInsert => {
                for item in decode::<Vec<Item>>(action).unwrap_or_default() {
                    self.items.insert(item.id, item);
                }
            }
            ActionType::ItemRemove => {
                for id in decode::<Vec<i64>>(action).unwrap_or_default() {
                    self.items.shift_remove(&id);
                }
            }
            ActionType::ItemUpdate => {
                if let Some(update) = decode::<ItemPhotos>(action) {
                    if let Some(item) = self.items.get_mut(&update.id) {
                        item.photos = update.photos;
                    }
                }
            }
            ActionType::ItemPhotosAdd => {
                if let Some(add) = decode::<ItemPhotosAdd>(action) {
                    if let Some(item) = self.items.get_mut(&add.id) {
                        item.photos.retain(|p| !add.photos.contains(p));
                        let at = add.idx.unwrap_or(item.photos.len()).min(item.photos.len());
                        item.photos.splice(at..at, add.photos);
                    }
                }
            }
            ActionType::ItemPhotosRemove => {
                if let Some(remove) = decode::<ItemPhotos>(action) {
                    if let Some(item) = self.items.get_mut(&remove.id) {
                        item.photos.retain(|p| !remove.photos.contains(p));
                    }
                }
            }

            ActionType::PhotoInsert => {
                for photo in decode::<Vec<Photo>>(action).unwrap_or_default() {
                    self.photos.insert(photo.id, photo);
                }
            }
            ActionType::PhotoRemove => {
                let ids = decode::<Vec<i64>>(action).unwrap_or_default();
                for id in &ids {
                    self.photos.shift_remove(id);
                }
                for item in self.items.values_mut() {
                    item.photos.retain(|p| !ids.contains(p));
                }
            }
            ActionType::PhotoUpdate => {
                if let Some(patch) = decode::<PhotoPatch>(action) {
                    self.patch_photo(&patch);
                }
            }
            ActionType::PhotoBulkUpdate => {
                for patch in decode::<Vec<PhotoPatch>>(action).unwrap_or_default() {
                    self.patch_photo(&patch);
                }
            }

            ActionType::NoteInsert => {
                for note in decode::<Vec<Note>>(action).unwrap_or_default() {
                    self.notes.insert(note.id, note);
                }
            }
            ActionType::NoteUpdate => {
                if let Some(note) = decode::<Note>(action) {
                    self.notes.insert(note.id, note);
                }
            }
            ActionType::NoteRemove => {
                for id in decode::<Vec<i64>>(action).unwrap_or_default() {
                    self.notes.shift_remove(&id);
                }
            }

            ActionType::VocabInsert => {
                for vocab in decode::<Vec<Vocab>>(action).unwrap_or_default() {
                    self.vocabs.insert(vocab.id.clone(), vocab);
                }
            }
            ActionType::VocabUpdate => {
                if let Some(save) = decode::<VocabSavePayload>(action) {
                    if let Some(vocab) = self.vocabs.get_mut(&save.id) {
                        vocab.title = save.title;
                    }
                }
            }
            ActionType::VocabRemove => {
                for id in decode::<Vec<String>>(action).unwrap_or_default() {
                    self.vocabs.shift_remove(&id);
                }
            }

            ActionType::TemplateInsert => {
                for template in decode::<Vec<Template>>(action).unwrap_or_default() {
                    self.templates.insert(template.id.clone(), template);
                }
            }
            ActionType::TemplateRemove => {
                for id in decode::<Vec<String>>(action).unwrap_or_default() {
                    self.templates.shift_remove(&id);
                }
            }

            ActionType::ActivityUpdate => {
                if let Some(event) = decode::<ProgressEvent>(action) {
                    if let Some(seq) = event.seq {
                        self.activities.insert(seq, event);
                    }
                }
            }
            ActionType::ActivityDone => {
                if let Some(done) = decode::<ActivityDone>(action) {
                    if let Some(seq) = done.seq {
                        self.activities.shift_remove(&seq);
                    }
                }
            }

            _ => {}
        }
    }

    fn patch_photo(&mut self, patch: &PhotoPatch) {
        let Some(photo) = self.photos.get_mut(&patch.id) else {
            return;
        };
        let from = photo.item;
        patch.apply(photo);
        let to = photo.item;
        if from != to {
            if let Some(item) = self.items.get_mut(&from) {
                item.photos.retain(|p| *p != patch.id);
            }
        }
    }

    pub fn item_photos(&self, item: i64) -> Option<&[i64]> {
        self.items.get(&item).map(|i| i.photos.as_slice())
    }
}
