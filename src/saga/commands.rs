//! Runs a command for every command-bearing action.
//!
//! Actions marked `async` run as child tasks; the rest run inline, so
//! they complete in the order they were issued.

use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};

use super::SessionContext;
use crate::action::params::ActivityDone;
use crate::action::{self, Action};
use crate::command::{Command, Completed};
use crate::store::Subscription;

pub(crate) async fn run(ctx: SessionContext, mut rx: Subscription) {
    let mut running: JoinSet<Completed> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = ctx.token.cancelled() => break,
            Some(joined) = running.join_next(), if !running.is_empty() => collect(&ctx, joined),
            action = rx.recv() => {
                let Some(action) = action else { break };
                if !action.kind.is_command() {
                    continue;
                }
                let Some(command) = create(&ctx, &action) else { continue };
                if action.meta.is_async {
                    running.spawn(command.run());
                } else {
                    let done = command.run().await;
                    complete(&ctx, &done);
                }
            }
        }
    }

    // Children share the session token and finish as cancelled.
    while let Some(joined) = running.join_next().await {
        collect(&ctx, joined);
    }
    tracing::debug!("command listener stopped");
}

fn create(ctx: &SessionContext, action: &Arc<Action>) -> Option<Command> {
    match Command::create_with(ctx.registry, Arc::clone(action), ctx.options()) {
        Ok(command) => Some(command),
        Err(e) => {
            ctx.fail(e, action.kind);
            None
        }
    }
}

fn collect(ctx: &SessionContext, joined: Result<Completed, JoinError>) {
    match joined {
        Ok(done) => complete(ctx, &done),
        Err(e) if e.is_panic() => tracing::error!("command panicked: {e}"),
        Err(_) => {}
    }
}

/// Route a finished command to history, the reporter and the activity log.
fn complete(ctx: &SessionContext, done: &Completed) {
    if let Some(entry) = done.history() {
        ctx.store.dispatch(action::history::tick(&entry));
    }
    if let Some(error) = done.failure() {
        ctx.reporter.fail(error, done.kind());
    }
    ctx.store.dispatch(action::activity::done(&ActivityDone {
        seq: done.id(),
        kind: done.kind(),
        duration_ms: u64::try_from(done.duration().as_millis()).unwrap_or(u64::MAX),
        error: done.failure().map(ToString::to_string),
        cancelled: done.is_cancelled(),
    }));
}
