//! Cooperative cancellation and the per-project task tree.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::action::Action;

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<TokenInner>>>,
}

impl TokenInner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Shared cancellation flag. Cancelling is idempotent and propagates to children.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled together with `self`, but cancellable on its own.
    pub fn child(&self) -> Self {
        let child = Self::new();
        if self.is_cancelled() {
            child.cancel();
        } else {
            let mut children = self.inner.children.lock();
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        child
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Receive the next action unless the token fires first.
pub async fn next_action(
    rx: &mut UnboundedReceiver<Arc<Action>>,
    token: &CancellationToken,
) -> Option<Arc<Action>> {
    tokio::select! {
        biased;
        () = token.cancelled() => None,
        action = rx.recv() => action,
    }
}

/// The listeners of one project session, torn down together.
#[derive(Debug)]
pub struct TaskTree {
    token: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskTree {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            handles: Vec::new(),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.push((name, tokio::spawn(task)));
    }

    /// Cancel every task and wait for them. Tasks still running after `grace`
    /// are aborted, which drops whatever they hold (open transactions included).
    pub async fn shutdown(mut self, grace: Duration) {
        self.token.cancel();

        let joined = tokio::time::timeout(
            grace,
            join_all(self.handles.iter_mut().map(|(_, handle)| handle)),
        )
        .await;

        match joined {
            Ok(results) => {
                for (result, (name, _)) in results.into_iter().zip(&self.handles) {
                    if let Err(e) = result {
                        if e.is_panic() {
                            tracing::error!(task = name, "task panicked: {e}");
                        }
                    }
                }
            }
            Err(_) => {
                for (name, handle) in &self.handles {
                    if !handle.is_finished() {
                        tracing::warn!(task = name, "task ignored cancellation; aborting");
                        handle.abort();
                    }
                }
                for (_, handle) in self.handles {
                    let _ = handle.await;
                }
            }
        }
    }
}
