//! Reacts to write-triggering actions.
//!
//! Each write is applied to the in-memory state first, then to storage. If
//! storage rejects it, a compensating action restores the previous state
//! and the failure goes to the reporter.

use super::SessionContext;
use crate::action::params::{ListCreatePayload, ProjectRename};
use crate::action::{self, Action, ActionType};
use crate::error::{CommandError, DbError};
use crate::history::HistoryEntry;
use crate::model;
use crate::store::Subscription;
use crate::task::next_action;

pub(crate) async fn run(ctx: SessionContext, mut rx: Subscription) {
    while let Some(action) = next_action(&mut rx, &ctx.token).await {
        if !action.kind.is_persistable() {
            continue;
        }
        if let Err(e) = handle(&ctx, &action).await {
            ctx.fail(e, action.kind);
        }
    }
    tracing::debug!("persistence listener stopped");
}

async fn handle(ctx: &SessionContext, action: &Action) -> Result<(), CommandError> {
    match action.kind {
        ActionType::ProjectPersist => rename(ctx, action).await,
        ActionType::ListCreate => {
            let ListCreatePayload { name, parent } = action.payload_as()?;
            let list = ctx
                .db
                .transaction(move |tx| model::list::create(tx, &name, parent))
                .await?;
            ctx.store.dispatch(action::list::insert(&[list]));
            Ok(())
        }
        ActionType::ListDelete => {
            let id: i64 = action.payload_as()?;
            let Some(before) = ctx.store.select(|s| s.lists.get(&id).cloned()) else {
                return Err(CommandError::not_found(format!("list {id}")));
            };
            ctx.store.dispatch(action::list::remove(id));
            let deleted: Result<(), DbError> = ctx
                .db
                .transaction(move |tx| model::list::delete(tx, id))
                .await;
            if let Err(e) = deleted {
                ctx.store.dispatch(action::list::insert(&[before]));
                return Err(e.into());
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn rename(ctx: &SessionContext, action: &Action) -> Result<(), CommandError> {
    let ProjectRename { name } = action.payload_as()?;
    let Some(previous) = ctx.store.select(|s| s.project.as_ref().map(|p| p.name.clone())) else {
        return Err(CommandError::not_found("open project"));
    };

    ctx.store
        .dispatch(action::project::update(&ProjectRename { name: name.clone() }));

    let id = ctx.project.id.clone();
    let renamed = ctx
        .db
        .transaction(move |tx| model::project::rename(tx, &id, &name))
        .await;
    if let Err(e) = renamed {
        ctx.store
            .dispatch(action::project::update(&ProjectRename { name: previous }));
        return Err(e.into());
    }

    if let Some(mode) = action.meta.history {
        let entry = HistoryEntry {
            undo: action::project::persist(&ProjectRename { name: previous }, false),
            redo: action.for_replay(),
            mode,
        };
        ctx.store.dispatch(action::history::tick(&entry));
    }
    Ok(())
}
