use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use super::registry::{CommandInfo, RegistryBuilder};
use super::{result, Context, Exec};
use crate::action::params::{VocabImportPayload, VocabSavePayload};
use crate::action::{self, ActionType};
use crate::error::{CommandError, ConfigError, DbError};
use crate::model;
use crate::prompt::PromptKind;

pub fn register(builder: &mut RegistryBuilder) -> Result<(), ConfigError> {
    builder
        .register::<VocabImport, VocabImportPayload>(
            ActionType::VocabImport,
            CommandInfo {
                description: "Import vocabulary files",
                undoable: true,
            },
        )?
        .register::<VocabDelete, Vec<String>>(
            ActionType::VocabDelete,
            CommandInfo {
                description: "Move vocabularies to the trash",
                undoable: true,
            },
        )?
        .register::<VocabRestore, Vec<String>>(
            ActionType::VocabRestore,
            CommandInfo {
                description: "Restore trashed vocabularies",
                undoable: true,
            },
        )?
        .register::<VocabSave, VocabSavePayload>(
            ActionType::VocabSave,
            CommandInfo {
                description: "Rename a vocabulary",
                undoable: true,
            },
        )?
        .register::<VocabLoad, ()>(
            ActionType::VocabLoad,
            CommandInfo {
                description: "Load vocabularies into memory",
                undoable: false,
            },
        )?;
    Ok(())
}

/// Vocabularies are imported one file per transaction. `written` holds the
/// ids of every file sent to storage, confirmed new beforehand, so an
/// interrupted import can purge them whether or not the write came back.
#[derive(Debug, Default)]
pub struct VocabImport {
    written: Vec<String>,
}

/// Import every vocabulary of one file atomically. Returns the new ids.
async fn import_file(
    ctx: &Context,
    written: &mut Vec<String>,
    path: PathBuf,
    protected: bool,
) -> Result<Vec<String>, CommandError> {
    let data = tokio::task::spawn_blocking(move || model::vocab::read_file(&path))
        .await
        .map_err(|e| CommandError::Storage(e.to_string()))??;

    let wanted: Vec<String> = data.iter().map(|v| v.id.clone()).collect();
    let lookup = wanted.clone();
    let taken = ctx.db().call(move |c| model::vocab::load(c, &lookup)).await?;
    if let Some(vocab) = taken.first() {
        return Err(CommandError::Validation(format!(
            "vocabulary {} already exists",
            vocab.id
        )));
    }
    written.extend(wanted);

    let ids = ctx
        .db()
        .transaction(move |tx| {
            data.iter()
                .map(|vocab| {
                    model::vocab::create(tx, vocab, protected)?;
                    Ok(vocab.id.clone())
                })
                .collect::<Result<Vec<_>, DbError>>()
        })
        .await?;
    Ok(ids)
}

#[async_trait]
impl Exec for VocabImport {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let payload: VocabImportPayload = ctx.payload()?;
        let files = match payload.files {
            Some(files) => files,
            None => match ctx.prompt_files(PromptKind::Vocabularies).await? {
                Some(files) => files,
                None => return Ok(result(&Vec::<String>::new())),
            },
        };

        let total = files.len();
        let mut ids = Vec::new();
        for (i, file) in files.into_iter().enumerate() {
            ctx.check_cancelled()?;
            let display = file.display().to_string();
            match import_file(ctx, &mut self.written, file, payload.protected).await {
                Ok(imported) => ids.extend(imported),
                Err(e) => {
                    ctx.warn(&format!("failed to import vocabulary {display}: {e}"));
                    ctx.fail(&e);
                }
            }
            ctx.progress(total, i + 1);
        }

        if ids.is_empty() {
            return Ok(result(&ids));
        }

        let loaded = ids.clone();
        let vocabs = ctx
            .db()
            .call(move |c| model::vocab::load(c, &loaded))
            .await?;
        ctx.put(action::vocab::insert(&vocabs));

        ctx.set_undo(action::vocab::delete(&ids));
        ctx.set_redo(action::vocab::restore(&ids));
        Ok(result(&ids))
    }

    async fn abort(&mut self, ctx: &mut Context, _error: &CommandError) {
        if self.written.is_empty() {
            return;
        }
        let ids = self.written.clone();
        let purging = ids.clone();
        match ctx
            .db()
            .transaction(move |tx| model::vocab::purge(tx, &purging))
            .await
        {
            Ok(()) => {
                tracing::info!(count = ids.len(), "rolled back unfinished vocabulary import");
                ctx.put(action::vocab::remove(&ids));
            }
            Err(e) => tracing::warn!("failed to roll back unfinished vocabulary import: {e}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct VocabDelete;

#[async_trait]
impl Exec for VocabDelete {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let ids: Vec<String> = ctx.payload()?;
        let targets = ids.clone();
        ctx.db()
            .transaction(move |tx| {
                if let Some(v) = model::vocab::load(tx, &targets)?
                    .into_iter()
                    .find(|v| v.protected)
                {
                    return Err(DbError::Invalid(format!("vocabulary {} is protected", v.id)));
                }
                model::vocab::delete(tx, &targets)
            })
            .await?;
        ctx.put(action::vocab::remove(&ids));

        ctx.set_undo(action::vocab::restore(&ids));
        Ok(result(&ids))
    }
}

#[derive(Debug, Default)]
pub struct VocabRestore;

#[async_trait]
impl Exec for VocabRestore {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let ids: Vec<String> = ctx.payload()?;
        let targets = ids.clone();
        let vocabs = ctx
            .db()
            .transaction(move |tx| {
                model::vocab::restore(tx, &targets)?;
                model::vocab::load(tx, &targets)
            })
            .await?;
        ctx.put(action::vocab::insert(&vocabs));

        ctx.set_undo(action::vocab::delete(&ids));
        Ok(result(&ids))
    }
}

#[derive(Debug, Default)]
pub struct VocabSave;

#[async_trait]
impl Exec for VocabSave {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let payload: VocabSavePayload = ctx.payload()?;
        let VocabSavePayload { id, title } = payload.clone();
        let previous = ctx
            .db()
            .transaction(move |tx| {
                let previous = model::vocab::title(tx, &id)?;
                model::vocab::save(tx, &id, &title)?;
                Ok(previous)
            })
            .await?;
        ctx.put(action::vocab::update(&payload));

        ctx.set_undo(action::vocab::save(&VocabSavePayload {
            id: payload.id.clone(),
            title: previous,
        }));
        Ok(result(&payload))
    }
}

#[derive(Debug, Default)]
pub struct VocabLoad;

#[async_trait]
impl Exec for VocabLoad {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let vocabs = ctx.db().seq(|tx| model::vocab::load(tx, &[])).await?;
        ctx.put(action::vocab::insert(&vocabs));
        Ok(result(&vocabs.len()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::report::Reporter;
    use crate::testing;
    use std::sync::Arc;

    fn write(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn import_isolates_bad_files_and_inverts() {
        let (dir, options, reporter) = testing::options().await;
        let files = vec![
            write(
                dir.path(),
                "dc.json",
                r#"{"id":"dc","title":"Dublin Core","terms":[{"id":"dc:title"},{"id":"dc:date"}]}"#,
            ),
            write(dir.path(), "bad.json", "{ not json"),
            write(
                dir.path(),
                "more.json",
                r#"[{"id":"a","title":"A"},{"id":"b","title":"B"}]"#,
            ),
        ];

        let done = testing::run(
            &options,
            action::vocab::import(&VocabImportPayload {
                files: Some(files),
                protected: false,
            }),
        )
        .await;
        assert!(done.error().is_none());
        assert_eq!(done.result().unwrap(), &serde_json::json!(["dc", "a", "b"]));
        assert_eq!(reporter.failures().len(), 1);
        assert_eq!(options.store.select(|s| s.vocabs["dc"].terms), 2);

        let entry = done.history().unwrap();
        testing::run(&options, entry.undo).await;
        assert!(options.store.select(|s| s.vocabs.is_empty()));
        testing::run(&options, entry.redo).await;
        assert_eq!(options.store.select(|s| s.vocabs.len()), 3);
    }

    #[tokio::test]
    async fn duplicate_ids_roll_back_the_whole_file() {
        let (dir, options, reporter) = testing::options().await;
        let first = write(dir.path(), "a.json", r#"{"id":"a","title":"A"}"#);
        let second = write(
            dir.path(),
            "ab.json",
            r#"[{"id":"b","title":"B"},{"id":"a","title":"again"}]"#,
        );
        let done = testing::run(
            &options,
            action::vocab::import(&VocabImportPayload {
                files: Some(vec![first, second]),
                protected: false,
            }),
        )
        .await;
        assert_eq!(done.result().unwrap(), &serde_json::json!(["a"]));
        assert_eq!(reporter.failures().len(), 1);
        let stored = options
            .db
            .call(|c| model::vocab::load(c, &[]))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_import_purges_written_files() {
        let (dir, options, _) = testing::options().await;
        let kept = write(dir.path(), "k.json", r#"{"id":"k","title":"Kept"}"#);
        testing::run(
            &options,
            action::vocab::import(&VocabImportPayload {
                files: Some(vec![kept]),
                protected: false,
            }),
        )
        .await;

        let reporter = Arc::new(testing::CancelOnWarn::default());
        let options = options
            .with_cancel(reporter.token.clone())
            .with_reporter(Arc::clone(&reporter) as Arc<dyn Reporter>);
        let files = vec![
            write(dir.path(), "a.json", r#"{"id":"a","title":"A"}"#),
            write(dir.path(), "bad.json", "{ not json"),
            write(dir.path(), "b.json", r#"{"id":"b","title":"B"}"#),
        ];
        let done = testing::run(
            &options,
            action::vocab::import(&VocabImportPayload {
                files: Some(files),
                protected: false,
            }),
        )
        .await;

        assert!(done.is_cancelled());
        assert!(!done.is_reversible());
        let stored: Vec<String> = options
            .db
            .call(|c| model::vocab::load(c, &[]))
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(stored, vec!["k".to_string()]);
        let purged = options
            .db
            .call(|c| model::vocab::load(c, &["a".to_string()]))
            .await
            .unwrap();
        assert!(purged.is_empty());
        assert_eq!(options.store.select(|s| s.vocabs.len()), 1);
    }

    #[tokio::test]
    async fn protected_vocabularies_cannot_be_deleted() {
        let (dir, options, _) = testing::options().await;
        let file = write(dir.path(), "a.json", r#"{"id":"a","title":"A"}"#);
        testing::run(
            &options,
            action::vocab::import(&VocabImportPayload {
                files: Some(vec![file]),
                protected: true,
            }),
        )
        .await;
        let done = testing::run(&options, action::vocab::delete(&["a".to_string()])).await;
        assert!(done.failure().is_some());
        assert!(options.store.select(|s| s.vocabs.contains_key("a")));
    }

    #[tokio::test]
    async fn rename_undo_restores_title() {
        let (dir, options, _) = testing::options().await;
        let file = write(dir.path(), "a.json", r#"{"id":"a","title":"A"}"#);
        testing::run(
            &options,
            action::vocab::import(&VocabImportPayload {
                files: Some(vec![file]),
                protected: false,
            }),
        )
        .await;
        let renamed = testing::run(
            &options,
            action::vocab::save(&VocabSavePayload {
                id: "a".into(),
                title: "Alpha".into(),
            }),
        )
        .await;
        assert_eq!(options.store.select(|s| s.vocabs["a"].title.clone()), "Alpha");
        testing::run(&options, renamed.history().unwrap().undo).await;
        assert_eq!(options.store.select(|s| s.vocabs["a"].title.clone()), "A");
    }
}
