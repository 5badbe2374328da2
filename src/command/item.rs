use async_trait::async_trait;
use serde_json::Value;

use super::registry::{CommandInfo, RegistryBuilder};
use super::{result, Context, Exec};
use crate::action::params::ItemIds;
use crate::action::{self, ActionType};
use crate::error::{CommandError, ConfigError};
use crate::model;

pub fn register(builder: &mut RegistryBuilder) -> Result<(), ConfigError> {
    builder
        .register::<ItemCreate, ()>(
            ActionType::ItemCreate,
            CommandInfo {
                description: "Create an empty item",
                undoable: true,
            },
        )?
        .register::<ItemDelete, ItemIds>(
            ActionType::ItemDelete,
            CommandInfo {
                description: "Move items to the trash",
                undoable: true,
            },
        )?
        .register::<ItemRestore, ItemIds>(
            ActionType::ItemRestore,
            CommandInfo {
                description: "Restore items from the trash",
                undoable: true,
            },
        )?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct ItemCreate;

#[async_trait]
impl Exec for ItemCreate {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let item = ctx.db().transaction(|tx| model::item::create(tx)).await?;
        ctx.put(action::item::insert(std::slice::from_ref(&item)));

        let ids = ItemIds {
            items: vec![item.id],
        };
        ctx.set_undo(action::item::delete(&ids));
        ctx.set_redo(action::item::restore(&ids));
        Ok(result(&item))
    }
}

#[derive(Debug, Default)]
pub struct ItemDelete;

#[async_trait]
impl Exec for ItemDelete {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let ids: ItemIds = ctx.payload()?;
        let items = ids.items.clone();
        ctx.db()
            .transaction(move |tx| model::item::delete(tx, &items))
            .await?;
        ctx.put(action::item::remove(&ids.items));

        ctx.set_undo(action::item::restore(&ids));
        Ok(result(&ids.items))
    }
}

#[derive(Debug, Default)]
pub struct ItemRestore;

#[async_trait]
impl Exec for ItemRestore {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let ids: ItemIds = ctx.payload()?;
        let items = ids.items.clone();
        let restored = ctx
            .db()
            .transaction(move |tx| {
                model::item::restore(tx, &items)?;
                model::item::load(tx, &items)
            })
            .await?;
        ctx.put(action::item::insert(&restored));

        ctx.set_undo(action::item::delete(&ids));
        Ok(result(&ids.items))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use crate::action;
    use crate::action::params::ItemIds;
    use crate::testing;

    #[tokio::test]
    async fn create_delete_restore_round_trip() {
        let (_dir, options, _) = testing::options().await;
        let created = testing::run(&options, action::item::create()).await;
        assert!(created.is_reversible());
        let id = created.result().unwrap()["id"].as_i64().unwrap();
        assert!(options.store.select(|s| s.items.contains_key(&id)));

        let undo = created.history().unwrap().undo;
        assert_eq!(undo.payload_as::<ItemIds>().unwrap().items, vec![id]);
        testing::run(&options, undo).await;
        assert!(!options.store.select(|s| s.items.contains_key(&id)));
        let live = options.db.call(|c| crate::model::item::all(c)).await.unwrap();
        assert!(live.is_empty());

        testing::run(&options, created.history().unwrap().redo).await;
        assert!(options.store.select(|s| s.items.contains_key(&id)));
    }
}
