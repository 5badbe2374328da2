use super::SessionContext;
use crate::action::{self, Action, ActionType};
use crate::history::{HistoryEntry, HistoryStack};
use crate::store::Subscription;
use crate::task::next_action;

/// Owns the session's undo stack. Replays are dispatched synchronously so
/// the command listener runs them inline, one after another.
pub(crate) async fn run(ctx: SessionContext, mut rx: Subscription, limit: usize) {
    let mut stack = HistoryStack::new(limit);

    while let Some(action) = next_action(&mut rx, &ctx.token).await {
        let changed = match action.kind {
            ActionType::HistoryTick => match action.payload_as::<HistoryEntry>() {
                Ok(entry) => {
                    stack.record(entry);
                    true
                }
                Err(e) => {
                    ctx.fail(e, action.kind);
                    false
                }
            },
            ActionType::HistoryUndo => replay(&ctx, stack.undo()),
            ActionType::HistoryRedo => replay(&ctx, stack.redo()),
            ActionType::HistoryDrop => {
                stack.clear();
                true
            }
            _ => false,
        };
        if changed {
            ctx.store.dispatch(action::history::update(&stack.state()));
        }
    }
    tracing::debug!("history listener stopped");
}

fn replay(ctx: &SessionContext, action: Option<Action>) -> bool {
    let Some(mut action) = action else {
        return false;
    };
    action.meta.is_async = false;
    ctx.store.dispatch(action);
    true
}
