//! Template commands. Protected templates are read-only: saving, deleting and
//! editing their fields is refused.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use super::registry::{CommandInfo, RegistryBuilder};
use super::{result, Context, Exec};
use crate::action::params::{
    TemplateFieldAddPayload, TemplateFieldOrderPayload, TemplateFieldRemovePayload,
    TemplateImportPayload, TemplateSavePayload,
};
use crate::action::{self, ActionType};
use crate::error::{CommandError, ConfigError, DbError};
use crate::model;
use crate::model::template::Template;
use crate::prompt::PromptKind;

pub fn register(builder: &mut RegistryBuilder) -> Result<(), ConfigError> {
    builder
        .register::<TemplateImport, TemplateImportPayload>(
            ActionType::TemplateImport,
            CommandInfo {
                description: "Import template files",
                undoable: true,
            },
        )?
        .register::<TemplateCreate, Vec<Template>>(
            ActionType::TemplateCreate,
            CommandInfo {
                description: "Create templates",
                undoable: true,
            },
        )?
        .register::<TemplateSave, TemplateSavePayload>(
            ActionType::TemplateSave,
            CommandInfo {
                description: "Change template properties",
                undoable: true,
            },
        )?
        .register::<TemplateDelete, Vec<String>>(
            ActionType::TemplateDelete,
            CommandInfo {
                description: "Delete templates",
                undoable: true,
            },
        )?
        .register::<TemplateFieldAdd, TemplateFieldAddPayload>(
            ActionType::TemplateFieldAdd,
            CommandInfo {
                description: "Add a field to a template",
                undoable: true,
            },
        )?
        .register::<TemplateFieldRemove, TemplateFieldRemovePayload>(
            ActionType::TemplateFieldRemove,
            CommandInfo {
                description: "Remove a field from a template",
                undoable: true,
            },
        )?
        .register::<TemplateFieldOrder, TemplateFieldOrderPayload>(
            ActionType::TemplateFieldOrder,
            CommandInfo {
                description: "Reorder the fields of a template",
                undoable: true,
            },
        )?
        .register::<TemplateLoad, ()>(
            ActionType::TemplateLoad,
            CommandInfo {
                description: "Load templates into memory",
                undoable: false,
            },
        )?;
    Ok(())
}

/// Reload one template and publish it.
async fn publish(ctx: &Context, id: String) -> Result<(), CommandError> {
    let template = ctx
        .db()
        .call(move |c| model::template::get(c, &id))
        .await?;
    if let Some(template) = template {
        ctx.put(action::template::insert(&[template]));
    }
    Ok(())
}

// ── Import ──────────────────────────────────────────────────────

/// One file per transaction, like vocabulary imports. `written` holds every
/// id sent to storage so an interrupted import can remove them again.
#[derive(Debug, Default)]
pub struct TemplateImport {
    written: Vec<String>,
}

async fn import_file(
    ctx: &Context,
    written: &mut Vec<String>,
    path: PathBuf,
    protected: bool,
) -> Result<Vec<String>, CommandError> {
    let templates =
        tokio::task::spawn_blocking(move || model::template::read_file(&path, protected))
            .await
            .map_err(|e| CommandError::Storage(e.to_string()))??;

    let wanted: Vec<String> = templates.iter().map(|t| t.id.clone()).collect();
    let lookup = wanted.clone();
    let taken = ctx
        .db()
        .call(move |c| model::template::load(c, &lookup))
        .await?;
    if let Some(template) = taken.first() {
        return Err(CommandError::Validation(format!(
            "template {} already exists",
            template.id
        )));
    }
    written.extend(wanted);

    let ids = ctx
        .db()
        .transaction(move |tx| {
            templates
                .iter()
                .map(|template| {
                    model::template::create(tx, template)?;
                    Ok(template.id.clone())
                })
                .collect::<Result<Vec<_>, DbError>>()
        })
        .await?;
    Ok(ids)
}

#[async_trait]
impl Exec for TemplateImport {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let payload: TemplateImportPayload = ctx.payload()?;
        let files = match payload.files {
            Some(files) => files,
            None => match ctx.prompt_files(PromptKind::Templates).await? {
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
                    ctx.warn(&format!("failed to import template {display}: {e}"));
                    ctx.fail(&e);
                }
            }
            ctx.progress(total, i + 1);
        }

        if ids.is_empty() {
            return Ok(result(&ids));
        }

        let loaded = ids.clone();
        let templates = ctx
            .db()
            .call(move |c| model::template::load(c, &loaded))
            .await?;
        ctx.put(action::template::insert(&templates));

        // Protected templates cannot be deleted, so such imports are final.
        if !payload.protected {
            ctx.set_undo(action::template::delete(&ids));
            ctx.set_redo(action::template::create(&templates));
        }
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
            .transaction(move |tx| model::template::delete(tx, &purging))
            .await
        {
            Ok(()) => {
                tracing::info!(count = ids.len(), "rolled back unfinished template import");
                ctx.put(action::template::remove(&ids));
            }
            Err(e) => tracing::warn!("failed to roll back unfinished template import: {e}"),
        }
    }
}

// ── Create / delete ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TemplateCreate;

#[async_trait]
impl Exec for TemplateCreate {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let templates: Vec<Template> = ctx.payload()?;
        let ids: Vec<String> = templates.iter().map(|t| t.id.clone()).collect();
        let loaded = ids.clone();
        let created = ctx
            .db()
            .transaction(move |tx| {
                for template in &templates {
                    model::template::create(tx, template)?;
                }
                model::template::load(tx, &loaded)
            })
            .await?;
        ctx.put(action::template::insert(&created));

        ctx.set_undo(action::template::delete(&ids));
        Ok(result(&ids))
    }
}

#[derive(Debug, Default)]
pub struct TemplateDelete;

#[async_trait]
impl Exec for TemplateDelete {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let ids: Vec<String> = ctx.payload()?;
        let targets = ids.clone();
        let originals = ctx
            .db()
            .transaction(move |tx| {
                let originals = targets
                    .iter()
                    .map(|id| model::template::editable(tx, id))
                    .collect::<Result<Vec<_>, DbError>>()?;
                model::template::delete(tx, &targets)?;
                Ok(originals)
            })
            .await?;
        ctx.put(action::template::remove(&ids));

        ctx.set_undo(action::template::create(&originals));
        Ok(result(&ids))
    }
}

// ── Save ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TemplateSave;

#[async_trait]
impl Exec for TemplateSave {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let payload: TemplateSavePayload = ctx.payload()?;
        let TemplateSavePayload { id, data } = payload.clone();
        let previous = ctx
            .db()
            .transaction(move |tx| {
                let previous = model::template::editable(tx, &id)?.fields_like(&data);
                model::template::save(tx, &id, &data)?;
                Ok(previous)
            })
            .await?;
        publish(ctx, payload.id.clone()).await?;

        ctx.set_undo(action::template::save(&TemplateSavePayload {
            id: payload.id.clone(),
            data: previous,
        }));
        Ok(result(&payload))
    }
}

// ── Fields ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TemplateFieldAdd;

#[async_trait]
impl Exec for TemplateFieldAdd {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let payload: TemplateFieldAddPayload = ctx.payload()?;
        if payload.field.property.trim().is_empty() {
            return Err(CommandError::Validation("field property must not be empty".into()));
        }
        let TemplateFieldAddPayload { id, field, idx } = payload.clone();
        let added = ctx
            .db()
            .transaction(move |tx| {
                model::template::editable(tx, &id)?;
                model::template::add_field(tx, &id, &field, idx)
            })
            .await?;
        publish(ctx, payload.id.clone()).await?;

        if let Some(field) = added.id {
            ctx.set_undo(action::template::field_remove(&TemplateFieldRemovePayload {
                id: payload.id.clone(),
                field,
            }));
            // Redo brings back the same field id.
            ctx.set_redo(action::template::field_add(&TemplateFieldAddPayload {
                id: payload.id,
                field: added.clone(),
                idx: payload.idx,
            }));
        }
        Ok(result(&added))
    }
}

#[derive(Debug, Default)]
pub struct TemplateFieldRemove;

#[async_trait]
impl Exec for TemplateFieldRemove {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let payload: TemplateFieldRemovePayload = ctx.payload()?;
        let TemplateFieldRemovePayload { id, field } = payload.clone();
        let (removed, idx) = ctx
            .db()
            .transaction(move |tx| {
                model::template::editable(tx, &id)?;
                model::template::remove_field(tx, &id, field)
            })
            .await?;
        publish(ctx, payload.id.clone()).await?;

        ctx.set_undo(action::template::field_add(&TemplateFieldAddPayload {
            id: payload.id.clone(),
            field: removed,
            idx: Some(idx),
        }));
        Ok(result(&payload))
    }
}

/// Sets the complete field order. The payload must be a permutation of the
/// template's current fields.
#[derive(Debug, Default)]
pub struct TemplateFieldOrder;

#[async_trait]
impl Exec for TemplateFieldOrder {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let payload: TemplateFieldOrderPayload = ctx.payload()?;
        let TemplateFieldOrderPayload { id, fields } = payload.clone();
        let previous = ctx
            .db()
            .transaction(move |tx| {
                let previous = model::template::editable(tx, &id)?.field_ids();
                let mut wanted = fields.clone();
                let mut current = previous.clone();
                wanted.sort_unstable();
                current.sort_unstable();
                if wanted != current {
                    return Err(DbError::Invalid(format!(
                        "field order for template {id} must list each of its fields once"
                    )));
                }
                model::template::set_field_order(tx, &id, &fields)?;
                Ok(previous)
            })
            .await?;
        publish(ctx, payload.id.clone()).await?;

        ctx.set_undo(action::template::field_order(&TemplateFieldOrderPayload {
            id: payload.id.clone(),
            fields: previous,
        }));
        Ok(result(&payload))
    }
}

#[derive(Debug, Default)]
pub struct TemplateLoad;

#[async_trait]
impl Exec for TemplateLoad {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let templates = ctx.db().seq(|tx| model::template::load(tx, &[])).await?;
        ctx.put(action::template::insert(&templates));
        Ok(result(&templates.len()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::action::params::TemplateFields;
    use crate::model::template::Field;
    use crate::report::Reporter;
    use crate::testing;
    use std::sync::Arc;

    const LETTER: &str = r#"{
        "@id": "letter",
        "type": "Photo",
        "name": "Letter",
        "field": [
            { "property": "dc:title" },
            { "property": "dc:date" },
            { "property": "dc:creator" }
        ]
    }"#;

    fn write(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    async fn import(options: &crate::command::Options, file: PathBuf, protected: bool) {
        let done = testing::run(
            options,
            action::template::import(&TemplateImportPayload {
                files: Some(vec![file]),
                protected,
            }),
        )
        .await;
        assert!(done.error().is_none());
    }

    fn field_ids(options: &crate::command::Options) -> Vec<i64> {
        options.store.select(|s| s.templates["letter"].field_ids())
    }

    #[tokio::test]
    async fn import_undo_deletes_and_redo_recreates() {
        let (dir, options, reporter) = testing::options().await;
        let files = vec![
            write(dir.path(), "letter.json", LETTER),
            write(dir.path(), "bad.json", "[{ \"name\": 1 }]"),
        ];
        let done = testing::run(
            &options,
            action::template::import(&TemplateImportPayload {
                files: Some(files),
                protected: false,
            }),
        )
        .await;
        assert_eq!(done.result().unwrap(), &serde_json::json!(["letter"]));
        assert_eq!(reporter.failures().len(), 1);
        let fields = field_ids(&options);
        assert_eq!(fields.len(), 3);

        let entry = done.history().unwrap();
        testing::run(&options, entry.undo).await;
        assert!(options.store.select(|s| s.templates.is_empty()));
        testing::run(&options, entry.redo).await;
        assert_eq!(field_ids(&options), fields);
    }

    #[tokio::test]
    async fn cancelled_import_removes_written_templates() {
        let (dir, options, _) = testing::options().await;
        let reporter = Arc::new(testing::CancelOnWarn::default());
        let options = options
            .with_cancel(reporter.token.clone())
            .with_reporter(Arc::clone(&reporter) as Arc<dyn Reporter>);
        let files = vec![
            write(dir.path(), "letter.json", LETTER),
            write(dir.path(), "bad.json", "{ not json"),
            write(
                dir.path(),
                "memo.json",
                r#"{ "@id": "memo", "type": "Photo", "name": "Memo" }"#,
            ),
        ];
        let done = testing::run(
            &options,
            action::template::import(&TemplateImportPayload {
                files: Some(files),
                protected: false,
            }),
        )
        .await;

        assert!(done.is_cancelled());
        let stored = options
            .db
            .call(|c| model::template::load(c, &[]))
            .await
            .unwrap();
        assert!(stored.is_empty());
        assert!(options.store.select(|s| s.templates.is_empty()));
    }

    #[tokio::test]
    async fn protected_templates_are_read_only() {
        let (dir, options, _) = testing::options().await;
        import(&options, write(dir.path(), "letter.json", LETTER), true).await;

        let deleted = testing::run(&options, action::template::delete(&["letter".to_string()])).await;
        assert!(deleted.failure().is_some());
        let saved = testing::run(
            &options,
            action::template::save(&TemplateSavePayload {
                id: "letter".into(),
                data: TemplateFields {
                    name: Some("Memo".into()),
                    ..TemplateFields::default()
                },
            }),
        )
        .await;
        assert!(saved.failure().is_some());
        assert_eq!(options.store.select(|s| s.templates["letter"].name.clone()), "Letter");
    }

    #[tokio::test]
    async fn delete_undo_restores_fields_in_order() {
        let (dir, options, _) = testing::options().await;
        import(&options, write(dir.path(), "letter.json", LETTER), false).await;
        let fields = field_ids(&options);

        let done = testing::run(&options, action::template::delete(&["letter".to_string()])).await;
        assert!(options.store.select(|s| s.templates.is_empty()));
        testing::run(&options, done.history().unwrap().undo).await;
        assert_eq!(field_ids(&options), fields);
    }

    #[tokio::test]
    async fn save_undo_restores_previous_values() {
        let (dir, options, _) = testing::options().await;
        import(&options, write(dir.path(), "letter.json", LETTER), false).await;

        let done = testing::run(
            &options,
            action::template::save(&TemplateSavePayload {
                id: "letter".into(),
                data: TemplateFields {
                    name: Some("Memo".into()),
                    creator: Some(crate::action::params::FieldUpdate::Set("me".into())),
                    ..TemplateFields::default()
                },
            }),
        )
        .await;
        let template = options.store.select(|s| s.templates["letter"].clone());
        assert_eq!(template.name, "Memo");
        assert_eq!(template.creator.as_deref(), Some("me"));

        testing::run(&options, done.history().unwrap().undo).await;
        let template = options.store.select(|s| s.templates["letter"].clone());
        assert_eq!(template.name, "Letter");
        assert_eq!(template.creator, None);
    }

    #[tokio::test]
    async fn field_add_and_remove_invert_each_other() {
        let (dir, options, _) = testing::options().await;
        import(&options, write(dir.path(), "letter.json", LETTER), false).await;
        let before = field_ids(&options);

        let added = testing::run(
            &options,
            action::template::field_add(&TemplateFieldAddPayload {
                id: "letter".into(),
                field: Field {
                    id: None,
                    property: "dc:subject".into(),
                    label: Some("Subject".into()),
                    datatype: None,
                    required: false,
                    hint: None,
                    value: None,
                    constant: false,
                },
                idx: Some(1),
            }),
        )
        .await;
        let with = field_ids(&options);
        assert_eq!(with.len(), 4);
        assert_eq!(with[0], before[0]);
        assert_eq!(with[2..], before[1..]);

        let entry = added.history().unwrap();
        testing::run(&options, entry.undo).await;
        assert_eq!(field_ids(&options), before);
        testing::run(&options, entry.redo).await;
        assert_eq!(field_ids(&options), with);

        let removed = testing::run(
            &options,
            action::template::field_remove(&TemplateFieldRemovePayload {
                id: "letter".into(),
                field: before[1],
            }),
        )
        .await;
        assert!(!field_ids(&options).contains(&before[1]));
        testing::run(&options, removed.history().unwrap().undo).await;
        assert_eq!(field_ids(&options), with);
    }

    #[tokio::test]
    async fn field_order_undo_restores_previous_order() {
        let (dir, options, _) = testing::options().await;
        import(&options, write(dir.path(), "letter.json", LETTER), false).await;
        let before = field_ids(&options);
        let reversed: Vec<i64> = before.iter().rev().copied().collect();

        let done = testing::run(
            &options,
            action::template::field_order(&TemplateFieldOrderPayload {
                id: "letter".into(),
                fields: reversed.clone(),
            }),
        )
        .await;
        assert_eq!(field_ids(&options), reversed);
        testing::run(&options, done.history().unwrap().undo).await;
        assert_eq!(field_ids(&options), before);

        let partial = testing::run(
            &options,
            action::template::field_order(&TemplateFieldOrderPayload {
                id: "letter".into(),
                fields: before[..2].to_vec(),
            }),
        )
        .await;
        assert!(partial.failure().is_some());
        assert_eq!(field_ids(&options), before);
    }
}
