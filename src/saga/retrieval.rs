//! Reacts to read-triggering actions by loading from storage.

use super::SessionContext;
use crate::action::params::ProjectRename;
use crate::action::{self, Action, ActionType};
use crate::error::DbError;
use crate::model;
use crate::store::Subscription;
use crate::task::next_action;

pub(crate) async fn run(ctx: SessionContext, mut rx: Subscription) {
    while let Some(action) = next_action(&mut rx, &ctx.token).await {
        if !action.kind.is_retrievable() {
            continue;
        }
        if let Err(e) = handle(&ctx, &action).await {
            ctx.fail(e, action.kind);
        }
    }
    tracing::debug!("retrieval listener stopped");
}

async fn handle(ctx: &SessionContext, action: &Action) -> Result<(), DbError> {
    match action.kind {
        ActionType::ListLoad => {
            let lists = ctx.db.call(|c| model::list::load(c)).await?;
            ctx.store.dispatch(action::list::insert(&lists));
        }
        ActionType::ProjectReload => {
            let id = ctx.project.id.clone();
            let (name, items, photos) = ctx
                .db
                .seq(move |tx| {
                    let name = model::project::name(tx, &id)?;
                    let items = model::item::load(tx, &model::item::all(tx)?)?;
                    let photos = model::photo::load(tx, &model::photo::all(tx)?)?;
                    Ok((name, items, photos))
                })
                .await?;
            ctx.store
                .dispatch(action::project::update(&ProjectRename { name }));
            ctx.store.dispatch(action::item::insert(&items));
            ctx.store.dispatch(action::photo::insert(&photos));
        }
        _ => {}
    }
    Ok(())
}
