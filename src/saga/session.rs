use std::path::Path;

use super::{commands, history, persistence, retrieval, Env, SessionContext};
use crate::action;
use crate::action::params::ProjectOpenedPayload;
use crate::db::Database;
use crate::error::{AppError, DbError};
use crate::model;
use crate::nav;
use crate::task::{CancellationToken, TaskTree};

/// One open project: its database handle and the listeners bound to it.
pub(crate) struct Session {
    ctx: SessionContext,
    tree: TaskTree,
}

/// Refuse files without a project row before anything is written to them.
async fn prepare(db: &Database, file: &Path) -> Result<ProjectOpenedPayload, DbError> {
    if !db.call(model::project::exists).await? {
        return Err(DbError::NoProject(file.display().to_string()));
    }
    db.migrate().await?;
    let file = file.to_path_buf();
    db.call(move |c| model::project::load(c, &file)).await
}

impl Session {
    pub async fn open(file: &Path, env: &Env) -> Result<Self, AppError> {
        tracing::info!(file = %file.display(), "opening project");
        let db = Database::open(file).await?;
        let project = match prepare(&db, file).await {
            Ok(project) => project,
            Err(e) => {
                if let Err(close) = db.close().await {
                    tracing::warn!("failed to close {}: {close}", file.display());
                }
                return Err(e.into());
            }
        };

        let token = CancellationToken::new();
        let ctx = SessionContext {
            store: env.store.clone(),
            db,
            project: project.clone(),
            prompt: env.prompt.clone(),
            reporter: env.reporter.clone(),
            registry: env.registry,
            token: token.clone(),
        };

        // Subscribed before anything is announced so no listener misses
        // the loads dispatched below.
        let store = &env.store;
        let retrieval_rx = store.subscribe();
        let persistence_rx = store.subscribe();
        let commands_rx = store.subscribe();
        let history_rx = store.subscribe();

        store.dispatch(action::project::opened(&project));
        store.dispatch(action::history::drop());
        let nav = nav::restore(&env.config.app_config_dir, &project.id);
        store.dispatch(action::nav::restore(&nav));

        let mut tree = TaskTree::new(token);
        tree.spawn("retrieval", retrieval::run(ctx.clone(), retrieval_rx));
        tree.spawn("persistence", persistence::run(ctx.clone(), persistence_rx));
        tree.spawn("commands", commands::run(ctx.clone(), commands_rx));
        tree.spawn(
            "history",
            history::run(ctx.clone(), history_rx, env.config.history_limit),
        );

        store.dispatch(action::list::load());
        store.dispatch(action::project::reload());
        store.dispatch(action::vocab::load());
        store.dispatch(action::template::load());

        tracing::info!(id = %project.id, name = %project.name, "project open");
        Ok(Self { ctx, tree })
    }

    pub fn project(&self) -> &ProjectOpenedPayload {
        &self.ctx.project
    }

    /// Cancel and join every listener, then release the project.
    pub async fn teardown(self, env: &Env) {
        let Self { ctx, tree } = self;
        tracing::info!(id = %ctx.project.id, "closing project");

        tree.shutdown(env.config.shutdown_timeout).await;

        let nav = env.store.select(|s| s.nav.clone());
        if let Err(e) = nav::persist(&env.config.app_config_dir, &ctx.project.id, &nav) {
            tracing::warn!("failed to save navigation state: {e}");
        }
        if let Err(e) = ctx.db.close().await {
            tracing::warn!("failed to close {}: {e}", ctx.db.path().display());
        }
        env.store.dispatch(action::project::closed(&ctx.project.id));
    }
}
