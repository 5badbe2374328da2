//! Dispatch pipeline: middleware, reducer, then fan-out to subscribers.
//!
//! Dispatch is synchronous and serialized, so every subscriber observes
//! actions in exactly the order they were issued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::action::Action;
use crate::state::AppState;
use crate::util::now_ms;

/// A step every dispatched action passes through before the reducer.
pub trait Middleware: Send + Sync {
    fn handle(&self, action: &mut Action, state: &AppState);
}

/// Assigns `meta.seq` and `meta.now` to every action that has none.
#[derive(Debug, Default)]
pub struct SeqMiddleware {
    next: AtomicU64,
}

impl Middleware for SeqMiddleware {
    fn handle(&self, action: &mut Action, _state: &AppState) {
        if action.meta.seq.is_none() {
            action.meta.seq = Some(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        }
        if action.meta.now.is_none() {
            action.meta.now = Some(now_ms());
        }
    }
}

/// Traces every action.
#[derive(Debug, Default)]
pub struct LogMiddleware;

impl Middleware for LogMiddleware {
    fn handle(&self, action: &mut Action, _state: &AppState) {
        if action.error {
            tracing::warn!(action = %action, "error action dispatched");
        } else if action.kind.is_command() {
            tracing::debug!(action = %action, meta = ?action.meta, "dispatch");
        } else {
            tracing::trace!(action = %action, "dispatch");
        }
    }
}

pub type Subscription = UnboundedReceiver<Arc<Action>>;

struct StoreInner {
    state: RwLock<AppState>,
    middleware: Vec<Box<dyn Middleware>>,
    subscribers: Mutex<Vec<UnboundedSender<Arc<Action>>>>,
}

/// Cheaply clonable handle to the process-wide action pipeline.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("middleware", &self.inner.middleware.len())
            .finish_non_exhaustive()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// A store with the standard `seq` and `log` middleware.
    pub fn new() -> Self {
        Self::with_middleware(vec![
            Box::new(SeqMiddleware::default()),
            Box::new(LogMiddleware),
        ])
    }

    pub fn with_middleware(middleware: Vec<Box<dyn Middleware>>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(AppState::default()),
                middleware,
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Run `action` through the pipeline and hand it to every subscriber.
    pub fn dispatch(&self, mut action: Action) -> Arc<Action> {
        // Held for the whole dispatch: issue order is delivery order.
        let mut subscribers = self.inner.subscribers.lock();

        {
            let state = self.inner.state.read();
            for m in &self.inner.middleware {
                m.handle(&mut action, &state);
            }
        }
        self.inner.state.write().reduce(&action);

        let action = Arc::new(action);
        subscribers.retain(|tx| tx.send(Arc::clone(&action)).is_ok());
        action
    }

    /// Receive every action dispatched from now on.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = unbounded_channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Read-only access to the state. Locks for the duration of `f`.
    pub fn select<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let guard = self.inner.state.read();
        f(&guard)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::action::ActionType;

    #[test]
    fn seq_is_assigned_in_issue_order() {
        let store = Store::new();
        let mut rx = store.subscribe();
        let a = store.dispatch(Action::new(ActionType::ListLoad, ()));
        let b = store.dispatch(Action::new(ActionType::VocabLoad, ()));
        assert!(a.seq().unwrap() < b.seq().unwrap());
        assert!(a.meta.now.is_some());

        assert_eq!(rx.try_recv().unwrap().kind, ActionType::ListLoad);
        assert_eq!(rx.try_recv().unwrap().kind, ActionType::VocabLoad);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn existing_seq_is_kept() {
        let store = Store::new();
        let mut action = Action::new(ActionType::ListLoad, ());
        action.meta.seq = Some(42);
        assert_eq!(store.dispatch(action).seq(), Some(42));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let store = Store::new();
        let rx = store.subscribe();
        drop(rx);
        store.dispatch(Action::new(ActionType::ListLoad, ()));
        assert!(store.inner.subscribers.lock().is_empty());
    }

    #[test]
    fn reducer_runs_before_subscribers_see_the_action() {
        let store = Store::new();
        let nav = crate::nav::NavState {
            item: Some(3),
            ..Default::default()
        };
        store.dispatch(crate::action::nav::update(&nav));
        assert_eq!(store.select(|s| s.nav.item), Some(3));
    }
}
