use async_trait::async_trait;
use serde_json::Value;

use super::registry::{CommandInfo, RegistryBuilder};
use super::{result, Context, Exec};
use crate::action::params::{NoteCreatePayload, NoteSavePayload, NotesOfPhoto};
use crate::action::{self, ActionType, HistoryMode};
use crate::error::{CommandError, ConfigError};
use crate::model;

pub fn register(builder: &mut RegistryBuilder) -> Result<(), ConfigError> {
    builder
        .register::<NoteCreate, NoteCreatePayload>(
            ActionType::NoteCreate,
            CommandInfo {
                description: "Attach a note to a photo",
                undoable: true,
            },
        )?
        .register::<NoteSave, NoteSavePayload>(
            ActionType::NoteSave,
            CommandInfo {
                description: "Save note text",
                undoable: true,
            },
        )?
        .register::<NoteDelete, NotesOfPhoto>(
            ActionType::NoteDelete,
            CommandInfo {
                description: "Move notes to the trash",
                undoable: true,
            },
        )?
        .register::<NoteRestore, NotesOfPhoto>(
            ActionType::NoteRestore,
            CommandInfo {
                description: "Restore trashed notes",
                undoable: true,
            },
        )?
        .register::<NoteLoad, Vec<i64>>(
            ActionType::NoteLoad,
            CommandInfo {
                description: "Load notes into memory",
                undoable: false,
            },
        )?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct NoteCreate;

#[async_trait]
impl Exec for NoteCreate {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let NoteCreatePayload { photo, text, state } = ctx.payload()?;
        let note = ctx
            .db()
            .transaction(move |tx| {
                if model::photo::get(tx, photo)?.is_none() {
                    return Ok(None);
                }
                model::note::create(tx, photo, &text, &state).map(Some)
            })
            .await?
            .ok_or_else(|| CommandError::not_found(format!("photo {photo}")))?;
        ctx.put(action::note::insert(std::slice::from_ref(&note)));

        let ids = NotesOfPhoto {
            photo,
            notes: vec![note.id],
        };
        ctx.set_undo(action::note::delete(&ids));
        ctx.set_redo(action::note::restore(&ids));
        Ok(result(&note))
    }
}

#[derive(Debug, Default)]
pub struct NoteSave;

#[async_trait]
impl Exec for NoteSave {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let NoteSavePayload { id, text, state } = ctx.payload()?;
        let (before, after) = ctx
            .db()
            .transaction(move |tx| {
                let Some(before) = model::note::get(tx, id)? else {
                    return Ok(None);
                };
                model::note::save(tx, id, &text, &state)?;
                Ok(model::note::get(tx, id)?.map(|after| (before, after)))
            })
            .await?
            .ok_or_else(|| CommandError::not_found(format!("note {id}")))?;
        ctx.put(action::note::update(&after));

        ctx.set_undo(action::note::save(
            &NoteSavePayload {
                id,
                text: before.text,
                state: before.state,
            },
            HistoryMode::Tick,
        ));
        Ok(result(&after))
    }
}

#[derive(Debug, Default)]
pub struct NoteDelete;

#[async_trait]
impl Exec for NoteDelete {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let payload: NotesOfPhoto = ctx.payload()?;
        let ids = payload.notes.clone();
        ctx.db()
            .transaction(move |tx| model::note::delete(tx, &ids))
            .await?;
        ctx.put(action::note::remove(&payload.notes));

        ctx.set_undo(action::note::restore(&payload));
        Ok(result(&payload.notes))
    }
}

#[derive(Debug, Default)]
pub struct NoteRestore;

#[async_trait]
impl Exec for NoteRestore {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let payload: NotesOfPhoto = ctx.payload()?;
        let ids = payload.notes.clone();
        let notes = ctx
            .db()
            .transaction(move |tx| {
                model::note::restore(tx, &ids)?;
                model::note::load(tx, &ids)
            })
            .await?;
        ctx.put(action::note::insert(&notes));

        ctx.set_undo(action::note::delete(&payload));
        Ok(result(&payload.notes))
    }
}

#[derive(Debug, Default)]
pub struct NoteLoad;

#[async_trait]
impl Exec for NoteLoad {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let ids: Vec<i64> = ctx.payload()?;
        let notes = ctx.db().seq(move |tx| model::note::load(tx, &ids)).await?;
        ctx.put(action::note::insert(&notes));
        Ok(result(&notes.iter().map(|n| n.id).collect::<Vec<_>>()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::history::HistoryStack;
    use crate::testing;

    async fn photo(options: &crate::command::Options, dir: &std::path::Path) -> i64 {
        let item = testing::item(options).await;
        testing::import(options, item, &[testing::png(dir, "a.png", 1)]).await[0]
    }

    fn save(id: i64, text: &str, mode: HistoryMode) -> crate::action::Action {
        action::note::save(
            &NoteSavePayload {
                id,
                text: text.into(),
                state: Value::Null,
            },
            mode,
        )
    }

    #[tokio::test]
    async fn typing_merges_into_one_undo_step() {
        let (dir, options, _) = testing::options().await;
        let photo = photo(&options, dir.path()).await;
        let created = testing::run(
            &options,
            action::note::create(&NoteCreatePayload {
                photo,
                text: "a".into(),
                state: Value::Null,
            }),
        )
        .await;
        let id = created.result().unwrap()["id"].as_i64().unwrap();

        let mut stack = HistoryStack::new(10);
        for (text, mode) in [("ab", HistoryMode::Tick), ("abc", HistoryMode::Merge)] {
            let done = testing::run(&options, save(id, text, mode)).await;
            stack.record(done.history().unwrap());
        }
        assert_eq!(stack.len(), 1);
        assert_eq!(options.store.select(|s| s.notes[&id].text.clone()), "abc");

        testing::run(&options, stack.undo().unwrap()).await;
        assert_eq!(options.store.select(|s| s.notes[&id].text.clone()), "a");
        testing::run(&options, stack.redo().unwrap()).await;
        assert_eq!(options.store.select(|s| s.notes[&id].text.clone()), "abc");
    }

    #[tokio::test]
    async fn delete_and_restore() {
        let (dir, options, _) = testing::options().await;
        let photo = photo(&options, dir.path()).await;
        let created = testing::run(
            &options,
            action::note::create(&NoteCreatePayload {
                photo,
                text: "x".into(),
                state: serde_json::json!({ "doc": [] }),
            }),
        )
        .await;
        let id = created.result().unwrap()["id"].as_i64().unwrap();

        let ids = NotesOfPhoto {
            photo,
            notes: vec![id],
        };
        let deleted = testing::run(&options, action::note::delete(&ids)).await;
        assert!(!options.store.select(|s| s.notes.contains_key(&id)));
        let live = options
            .db
            .call(move |c| model::note::of_photo(c, photo))
            .await
            .unwrap();
        assert!(live.is_empty());

        testing::run(&options, deleted.history().unwrap().undo).await;
        let note = options.store.select(|s| s.notes[&id].clone());
        assert!(!note.deleted);
        assert_eq!(note.state, serde_json::json!({ "doc": [] }));
    }

    #[tokio::test]
    async fn note_on_unknown_photo_fails() {
        let (_dir, options, _) = testing::options().await;
        let done = testing::run(
            &options,
            action::note::create(&NoteCreatePayload {
                photo: 404,
                text: "x".into(),
                state: Value::Null,
            }),
        )
        .await;
        assert_eq!(done.failure(), Some(&CommandError::not_found("photo 404")));
    }
}
