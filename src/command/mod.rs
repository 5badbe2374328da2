//! The command engine: one [`Command`] per command-bearing [`Action`].
//!
//! A command is created from the process registry, run exactly once, and
//! yields a [`Completed`] outcome that has no mutating API. Failures and
//! cancellation are captured into the outcome; [`Command::run`] never fails.

pub mod clock;
pub mod item;
pub mod note;
pub mod photo;
pub mod registry;
pub mod template;
pub mod vocab;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::action::{Action, ActionType};
use crate::db::Database;
use crate::error::{CommandError, ConfigError};
use crate::history::HistoryEntry;
use crate::progress::ProgressEvent;
use crate::prompt::{NoPrompt, Prompt, PromptKind};
use crate::report::{LogReporter, Reporter};
use crate::state::AppState;
use crate::store::Store;
use crate::task::CancellationToken;
use crate::util::now_ms;

pub use clock::SuspendClock;
pub use registry::Registry;

/// Execution context shared by every command of one project session.
#[derive(Clone)]
pub struct Options {
    pub db: Database,
    pub store: Store,
    pub prompt: Arc<dyn Prompt>,
    pub reporter: Arc<dyn Reporter>,
    pub cancel: CancellationToken,
}

impl Options {
    pub fn new(db: Database, store: Store) -> Self {
        Self {
            db,
            store,
            prompt: Arc::new(NoPrompt),
            reporter: Arc::new(LogReporter),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn Prompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("db", &self.db.path())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// What a running command sees: its action, its options, and its undo/redo slots.
pub struct Context {
    action: Arc<Action>,
    options: Options,
    clock: SuspendClock,
    undo: Option<Action>,
    redo: Option<Action>,
}

impl Context {
    fn new(action: Arc<Action>, options: Options) -> Self {
        Self {
            action,
            options,
            clock: SuspendClock::new(),
            undo: None,
            redo: None,
        }
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, CommandError> {
        self.action.payload_as()
    }

    pub fn db(&self) -> &Database {
        &self.options.db
    }

    /// Read-only view of the application state.
    pub fn select<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        self.options.store.select(f)
    }

    /// Dispatch a follow-up action.
    pub fn put(&self, action: Action) -> Arc<Action> {
        self.options.store.dispatch(action)
    }

    pub fn progress(&self, total: usize, progress: usize) {
        self.put(crate::action::activity::update(&ProgressEvent {
            seq: self.action.seq(),
            kind: self.action.kind,
            total,
            progress,
        }));
    }

    pub fn warn(&self, message: &str) {
        self.options.reporter.warn(message);
    }

    pub fn fail(&self, error: &CommandError) {
        self.options.reporter.fail(error, self.action.kind);
    }

    pub fn check_cancelled(&self) -> Result<(), CommandError> {
        if self.options.cancel.is_cancelled() {
            Err(CommandError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Ask the user for files. Time spent waiting is excluded from the duration.
    pub async fn prompt_files(&self, kind: PromptKind) -> Result<Option<Vec<PathBuf>>, CommandError> {
        self.clock.suspend();
        let answer = tokio::select! {
            biased;
            () = self.options.cancel.cancelled() => Err(CommandError::Cancelled),
            files = self.options.prompt.prompt_files(kind) => Ok(files),
        };
        self.clock.resume();
        answer
    }

    /// Whether the action asked to be recorded in history.
    pub fn wants_history(&self) -> bool {
        self.action.meta.history.is_some()
    }

    /// Set the inverse action. Ignored unless the action requested history.
    pub fn set_undo(&mut self, action: Action) {
        if self.wants_history() {
            self.undo = Some(action);
        }
    }

    /// Set the replay action. Ignored unless the action requested history.
    pub fn set_redo(&mut self, action: Action) {
        if self.wants_history() {
            self.redo = Some(action);
        }
    }
}

/// Serialize a command result. Results are informational; failure yields `null`.
pub(crate) fn result<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

/// The behavior of one command type.
///
/// `exec` does the work and may suspend; `abort` runs only after `exec`
/// failed or was cancelled; `finally` always runs last.
#[async_trait]
pub trait Exec: Send {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError>;

    async fn abort(&mut self, _ctx: &mut Context, _error: &CommandError) {}

    async fn finally(&mut self, _ctx: &mut Context) {}
}

pub struct Command {
    exec: Box<dyn Exec>,
    ctx: Context,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("action", &self.ctx.action.to_string())
            .finish_non_exhaustive()
    }
}

impl Command {
    /// Instantiate the registered command for `action`.
    pub fn create(action: Arc<Action>, options: Options) -> Result<Self, ConfigError> {
        Self::create_with(registry::global()?, action, options)
    }

    pub fn create_with(
        registry: &Registry,
        action: Arc<Action>,
        options: Options,
    ) -> Result<Self, ConfigError> {
        let exec = registry.instantiate(action.kind)?;
        Ok(Self::with_exec(exec, action, options))
    }

    pub(crate) fn with_exec(exec: Box<dyn Exec>, action: Arc<Action>, options: Options) -> Self {
        Self {
            exec,
            ctx: Context::new(action, options),
        }
    }

    pub fn kind(&self) -> ActionType {
        self.ctx.action.kind
    }

    pub async fn run(mut self) -> Completed {
        let init = Instant::now();
        let init_ms = now_ms();
        let token = self.ctx.options.cancel.clone();

        let outcome = if token.is_cancelled() {
            Err(CommandError::Cancelled)
        } else {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(CommandError::Cancelled),
                result = self.exec.exec(&mut self.ctx) => result,
            }
        };

        if let Err(error) = &outcome {
            self.exec.abort(&mut self.ctx, error).await;
        }
        self.exec.finally(&mut self.ctx).await;

        let done = Instant::now();
        let suspended = self.ctx.clock.finish(done);
        let elapsed = done.saturating_duration_since(init);
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };

        let completed = Completed {
            action: self.ctx.action,
            init,
            done,
            init_ms,
            done_ms: init_ms.saturating_add(elapsed_ms),
            suspended,
            cancelled: error.is_some(),
            result,
            error,
            undo: self.ctx.undo,
            redo: self.ctx.redo,
        };
        tracing::debug!(
            command = %completed,
            duration_ms = completed.duration().as_millis(),
            cancelled = completed.cancelled,
            "command done"
        );
        completed
    }
}

/// The frozen outcome of a command.
#[derive(Debug, Clone)]
pub struct Completed {
    action: Arc<Action>,
    init: Instant,
    done: Instant,
    init_ms: u64,
    done_ms: u64,
    suspended: Duration,
    result: Option<Value>,
    error: Option<CommandError>,
    cancelled: bool,
    undo: Option<Action>,
    redo: Option<Action>,
}

impl Completed {
    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn kind(&self) -> ActionType {
        self.action.kind
    }

    /// The dispatch sequence id of the bound action.
    pub fn id(&self) -> Option<u64> {
        self.action.seq()
    }

    pub fn init_ms(&self) -> u64 {
        self.init_ms
    }

    pub fn done_ms(&self) -> u64 {
        self.done_ms
    }

    pub fn suspended(&self) -> Duration {
        self.suspended
    }

    /// Wall time between start and completion, minus suspended time.
    pub fn duration(&self) -> Duration {
        self.done
            .saturating_duration_since(self.init)
            .saturating_sub(self.suspended)
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&CommandError> {
        self.error.as_ref()
    }

    /// The error, unless the command was merely cancelled.
    pub fn failure(&self) -> Option<&CommandError> {
        self.error.as_ref().filter(|e| !e.is_cancellation())
    }

    /// True iff `exec` did not run to completion.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn undo(&self) -> Option<&Action> {
        self.undo.as_ref()
    }

    pub fn redo(&self) -> Option<&Action> {
        self.redo.as_ref()
    }

    pub fn is_reversible(&self) -> bool {
        self.error.is_none() && self.undo.is_some() && self.action.meta.history.is_some()
    }

    /// The history entry this outcome contributes. Without an explicit redo,
    /// redo replays the original action.
    pub fn history(&self) -> Option<HistoryEntry> {
        if !self.is_reversible() {
            return None;
        }
        Some(HistoryEntry {
            undo: self.undo.clone()?,
            redo: self
                .redo
                .clone()
                .unwrap_or_else(|| self.action.for_replay()),
            mode: self.action.meta.history?,
        })
    }
}

impl fmt::Display for Completed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}#{id}", self.kind()),
            None => write!(f, "{}", self.kind()),
        }
    }
}

impl Serialize for Completed {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Completed", 7)?;
        s.serialize_field("action", self.action.as_ref())?;
        s.serialize_field("init", &self.init_ms)?;
        s.serialize_field("done", &self.done_ms)?;
        s.serialize_field(
            "duration",
            &u64::try_from(self.duration().as_millis()).unwrap_or(u64::MAX),
        )?;
        s.serialize_field("result", &self.result)?;
        s.serialize_field("error", &self.error)?;
        s.serialize_field("cancelled", &self.cancelled)?;
        s.end()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::action::{ActionMeta, HistoryMode};
    use crate::testing::{self, ScriptedPrompt};

    struct Fails;

    #[async_trait]
    impl Exec for Fails {
        async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
            ctx.set_undo(Action::new(ActionType::ItemRestore, ()));
            Err(CommandError::Validation("nope".into()))
        }

        async fn abort(&mut self, ctx: &mut Context, error: &CommandError) {
            ctx.warn(&format!("aborting: {error}"));
        }

        async fn finally(&mut self, ctx: &mut Context) {
            ctx.warn("finally");
        }
    }

    struct Undoable;

    #[async_trait]
    impl Exec for Undoable {
        async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
            ctx.set_undo(Action::new(ActionType::ItemRestore, serde_json::json!({ "items": [1] })));
            Ok(serde_json::json!(1))
        }
    }

    struct Waits;

    #[async_trait]
    impl Exec for Waits {
        async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
            let files = ctx.prompt_files(PromptKind::Images).await?;
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(result(&files))
        }
    }

    fn action(meta: ActionMeta) -> Arc<Action> {
        let mut action = Action::new(ActionType::ItemDelete, serde_json::json!({ "items": [1] }))
            .with_meta(meta);
        action.meta.seq = Some(7);
        Arc::new(action)
    }

    #[tokio::test]
    async fn failure_is_captured_and_routed_through_abort_and_finally() {
        let (_dir, options, reporter) = testing::options().await;
        let done = Command::with_exec(Box::new(Fails), action(ActionMeta::mutation()), options)
            .run()
            .await;

        assert!(matches!(done.error(), Some(CommandError::Validation(_))));
        assert!(done.result().is_none());
        assert!(done.is_cancelled());
        assert!(!done.is_reversible());
        assert!(done.history().is_none());
        assert_eq!(reporter.warnings(), vec!["aborting: nope", "finally"]);
    }

    #[tokio::test]
    async fn success_with_history_is_reversible() {
        let (_dir, options, _) = testing::options().await;
        let done = Command::with_exec(Box::new(Undoable), action(ActionMeta::mutation()), options)
            .run()
            .await;
        assert!(!done.is_cancelled());
        assert!(done.is_reversible());
        let entry = done.history().unwrap();
        assert_eq!(entry.undo.kind, ActionType::ItemRestore);
        assert_eq!(entry.redo.kind, ActionType::ItemDelete);
        assert_eq!(entry.redo.meta.history, None);
        assert_eq!(entry.mode, HistoryMode::Tick);
        assert_eq!(done.to_string(), "item.delete#7");
    }

    #[tokio::test]
    async fn without_history_meta_no_undo_is_kept() {
        let (_dir, options, _) = testing::options().await;
        let done = Command::with_exec(Box::new(Undoable), action(ActionMeta::inverse()), options)
            .run()
            .await;
        assert!(done.undo().is_none());
        assert!(!done.is_reversible());
    }

    #[tokio::test]
    async fn unregistered_type_is_a_configuration_error() {
        let (_dir, options, _) = testing::options().await;
        let registry = registry::standard().unwrap();
        let err = Command::create_with(
            &registry,
            Arc::new(Action::new(ActionType::ListLoad, ())),
            options,
        )
        .err();
        assert_eq!(err, Some(ConfigError::Unregistered(ActionType::ListLoad)));
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_time_is_excluded_from_duration() {
        let (_dir, options, _) = testing::options().await;
        let prompt = ScriptedPrompt::delayed(Duration::from_millis(500), None);
        let options = options.with_prompt(Arc::new(prompt));
        let done = Command::with_exec(Box::new(Waits), action(ActionMeta::default()), options)
            .run()
            .await;
        assert_eq!(done.suspended(), Duration::from_millis(500));
        assert_eq!(done.duration(), Duration::from_millis(30));
        assert!(done.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_prompt_closes_suspension() {
        let (_dir, options, _) = testing::options().await;
        let token = options.cancel.clone();
        let prompt = ScriptedPrompt::delayed(Duration::from_secs(60), None);
        let options = options.with_prompt(Arc::new(prompt));
        let command = Command::with_exec(Box::new(Waits), action(ActionMeta::default()), options);
        let handle = tokio::spawn(command.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        let done = handle.await.unwrap();

        assert!(done.is_cancelled());
        assert!(done.error().unwrap().is_cancellation());
        assert!(done.failure().is_none());
        assert_eq!(done.duration(), Duration::ZERO);
    }

    #[tokio::test]
    async fn serializes_frozen_outcome() {
        let (_dir, options, _) = testing::options().await;
        let done = Command::with_exec(Box::new(Fails), action(ActionMeta::mutation()), options)
            .run()
            .await;
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["error"], "nope");
        assert_eq!(json["cancelled"], true);
        assert_eq!(json["result"], Value::Null);
        assert_eq!(json["action"]["type"], "item.delete");
    }
}
