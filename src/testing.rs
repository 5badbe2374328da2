//! Fixtures shared by the unit tests.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::action::params::PhotoCreatePayload;
use crate::action::{self, Action, ActionType};
use crate::command::{registry, Command, Completed, Options};
use crate::db::Database;
use crate::error::CommandError;
use crate::model;
use crate::prompt::{Prompt, PromptKind};
use crate::report::Reporter;
use crate::store::{Store, Subscription};
use crate::task::CancellationToken;

#[derive(Debug, Default)]
pub struct RecordingReporter {
    warnings: Mutex<Vec<String>>,
    failures: Mutex<Vec<(ActionType, String)>>,
}

impl RecordingReporter {
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    pub fn failures(&self) -> Vec<(ActionType, String)> {
        self.failures.lock().clone()
    }
}

impl Reporter for RecordingReporter {
    fn warn(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }

    fn fail(&self, error: &CommandError, kind: ActionType) {
        self.failures.lock().push((kind, error.to_string()));
    }
}

/// Cancels `token` on the first warning, as a user stopping a batch after an error would.
#[derive(Debug, Default)]
pub struct CancelOnWarn {
    pub token: CancellationToken,
}

impl Reporter for CancelOnWarn {
    fn warn(&self, _message: &str) {
        self.token.cancel();
    }

    fn fail(&self, _error: &CommandError, _kind: ActionType) {}
}

/// Answers prompts from a queue, optionally after a delay. An empty queue answers `None`.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Option<Vec<PathBuf>>>>,
    delay: Duration,
}

impl ScriptedPrompt {
    pub fn answers(answers: Vec<Option<Vec<PathBuf>>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(delay: Duration, answer: Option<Vec<PathBuf>>) -> Self {
        Self {
            answers: Mutex::new(VecDeque::from([answer])),
            delay,
        }
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn prompt_files(&self, _kind: PromptKind) -> Option<Vec<PathBuf>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answers.lock().pop_front().flatten()
    }
}

/// Never answers. Signals `entered` each time a prompt starts.
#[derive(Debug, Default)]
pub struct PendingPrompt {
    pub entered: Arc<Notify>,
}

#[async_trait]
impl Prompt for PendingPrompt {
    async fn prompt_files(&self, _kind: PromptKind) -> Option<Vec<PathBuf>> {
        self.entered.notify_one();
        std::future::pending().await
    }
}

/// Create a migrated project database named `name` in `dir`.
pub async fn project(dir: &Path, name: &str) -> PathBuf {
    let file = dir.join(format!("{name}.{}", crate::paths::PROJECT_EXT));
    let db = Database::create(&file).await.unwrap();
    db.migrate().await.unwrap();
    let name = name.to_string();
    db.call(move |c| model::project::create(c, &name, Some("project")))
        .await
        .unwrap();
    db.close().await.unwrap();
    file
}

/// A fresh project with its summary already announced to a new store.
pub async fn options() -> (tempfile::TempDir, Options, Arc<RecordingReporter>) {
    registry::init().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file = project(dir.path(), "test").await;
    let db = Database::open(&file).await.unwrap();
    let summary = db
        .call(move |c| model::project::load(c, &file))
        .await
        .unwrap();

    let store = Store::new();
    store.dispatch(action::project::opened(&summary));

    let reporter = Arc::new(RecordingReporter::default());
    let options = Options::new(db, store).with_reporter(Arc::clone(&reporter) as Arc<dyn Reporter>);
    (dir, options, reporter)
}

/// Dispatch `action` and run its command to completion.
pub async fn run(options: &Options, action: Action) -> Completed {
    let action = options.store.dispatch(action);
    Command::create(action, options.clone()).unwrap().run().await
}

pub async fn item(options: &Options) -> i64 {
    let done = run(options, action::item::create()).await;
    done.result().unwrap()["id"].as_i64().unwrap()
}

/// Import `files` into `item`, returning the new photo ids.
pub async fn import(options: &Options, item: i64, files: &[PathBuf]) -> Vec<i64> {
    let done = run(
        options,
        action::photo::create(&PhotoCreatePayload {
            item,
            files: Some(files.to_vec()),
            idx: None,
        }),
    )
    .await;
    let photos: Vec<model::photo::Photo> =
        serde_json::from_value(done.result().unwrap().clone()).unwrap();
    photos.into_iter().map(|p| p.id).collect()
}

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

fn png_bytes(seed: u8) -> Vec<u8> {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.extend(std::iter::repeat(seed).take(32));
    bytes
}

/// A minimal file recognized as PNG; `seed` varies the checksum.
pub fn png(dir: &Path, name: &str, seed: u8) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, png_bytes(seed)).unwrap();
    path
}

pub fn overwrite_png(path: &Path, seed: u8) {
    std::fs::write(path, png_bytes(seed)).unwrap();
}

pub fn garbage(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"definitely not an image").unwrap();
    path
}

/// Everything already delivered to `rx`.
pub fn drain(rx: &mut Subscription) -> Vec<Arc<Action>> {
    let mut out = Vec::new();
    while let Ok(action) = rx.try_recv() {
        out.push(action);
    }
    out
}

/// The next action of `kind`. Panics after five seconds.
pub async fn await_action(rx: &mut Subscription, kind: ActionType) -> Arc<Action> {
    await_matching(rx, kind, |_| true).await
}

/// The next action of `kind` accepted by `pred`. Panics after five seconds.
pub async fn await_matching(
    rx: &mut Subscription,
    kind: ActionType,
    pred: impl Fn(&Action) -> bool,
) -> Arc<Action> {
    let wait = async {
        loop {
            match rx.recv().await {
                Some(action) if action.kind == kind && pred(&action) => return action,
                Some(_) => {}
                None => panic!("store closed while waiting for {kind}"),
            }
        }
    };
    match tokio::time::timeout(Duration::from_secs(5), wait).await {
        Ok(action) => action,
        Err(_) => panic!("timed out waiting for {kind}"),
    }
}
