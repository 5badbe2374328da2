//! Project orchestration: one active project at a time.
//!
//! The [`Orchestrator`] runs the `Closed → Opening → Open → Closing → Closed`
//! state machine. Each open project is a [`session::Session`] owning its
//! database handle and a task tree of four listeners (retrieval, persistence,
//! commands, history). Opening another project tears the current session
//! down first.

mod commands;
mod history;
mod persistence;
mod retrieval;
mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use ts_rs::TS;

use crate::action::params::{ProjectOpenPayload, ProjectOpenedPayload};
use crate::action::ActionType;
use crate::command::Registry;
use crate::db::Database;
use crate::error::{AppError, CommandError};
use crate::prompt::Prompt;
use crate::report::Reporter;
use crate::settings::{AppSettings, DEFAULT_HISTORY_LIMIT, DEFAULT_SHUTDOWN_TIMEOUT_MS};
use crate::store::{Store, Subscription};
use crate::task::CancellationToken;

use session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Status {
    Closed,
    Opening,
    Open,
    Closing,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Where navigation state is kept between sessions.
    pub app_config_dir: PathBuf,
    pub history_limit: usize,
    /// How long a session's tasks may take to honor cancellation.
    pub shutdown_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn new(app_config_dir: &Path) -> Self {
        Self {
            app_config_dir: app_config_dir.to_path_buf(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        }
    }

    pub fn from_settings(app_config_dir: &Path, settings: &AppSettings) -> Self {
        Self {
            app_config_dir: app_config_dir.to_path_buf(),
            history_limit: settings.history_limit,
            shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
        }
    }
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub(crate) struct Env {
    pub store: Store,
    pub config: OrchestratorConfig,
    pub prompt: Arc<dyn Prompt>,
    pub reporter: Arc<dyn Reporter>,
    pub registry: &'static Registry,
}

/// What a session's listeners share. Cloned into every listener task.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub store: Store,
    pub db: Database,
    pub project: ProjectOpenedPayload,
    pub prompt: Arc<dyn Prompt>,
    pub reporter: Arc<dyn Reporter>,
    pub registry: &'static Registry,
    pub token: CancellationToken,
}

impl SessionContext {
    pub fn options(&self) -> crate::command::Options {
        crate::command::Options {
            db: self.db.clone(),
            store: self.store.clone(),
            prompt: Arc::clone(&self.prompt),
            reporter: Arc::clone(&self.reporter),
            cancel: self.token.clone(),
        }
    }

    /// Report a listener failure. Listeners never stop because of one.
    pub fn fail(&self, error: impl Into<CommandError>, kind: ActionType) {
        let error = error.into();
        tracing::warn!(action = %kind, "listener failed: {error}");
        self.reporter.fail(&error, kind);
    }
}

enum Request {
    Open {
        file: PathBuf,
        reply: oneshot::Sender<Result<ProjectOpenedPayload, AppError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

pub struct Orchestrator {
    env: Env,
    status: watch::Sender<Status>,
    session: Option<Session>,
}

impl Orchestrator {
    /// Start the main loop. It is subscribed to `store` before this returns,
    /// so a `project.open` dispatched right after is never missed.
    pub fn spawn(
        store: Store,
        config: OrchestratorConfig,
        prompt: Arc<dyn Prompt>,
        reporter: Arc<dyn Reporter>,
        registry: &'static Registry,
    ) -> OrchestratorHandle {
        let actions = store.subscribe();
        let (status, status_rx) = watch::channel(Status::Closed);
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let orchestrator = Orchestrator {
            env: Env {
                store: store.clone(),
                config,
                prompt,
                reporter,
                registry,
            },
            status,
            session: None,
        };
        let task = tokio::spawn(orchestrator.main(actions, requests_rx, token.clone()));

        OrchestratorHandle {
            store,
            status: status_rx,
            requests,
            token,
            task,
        }
    }

    fn set(&self, status: Status) {
        tracing::debug!(?status, "orchestrator");
        self.status.send_replace(status);
    }

    async fn main(
        mut self,
        mut actions: Subscription,
        mut requests: mpsc::UnboundedReceiver<Request>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                Some(request) = requests.recv() => match request {
                    Request::Open { file, reply } => {
                        let opened = self.open(file).await;
                        let _ = reply.send(opened);
                    }
                    Request::Close { reply } => {
                        self.close().await;
                        let _ = reply.send(());
                    }
                },
                action = actions.recv() => {
                    let Some(action) = action else { break };
                    match action.kind {
                        ActionType::ProjectOpen => match action.payload_as::<ProjectOpenPayload>() {
                            Ok(payload) => {
                                let _ = self.open(payload.file).await;
                            }
                            Err(e) => tracing::warn!("ignoring project.open: {e}"),
                        },
                        ActionType::ProjectClose => self.close().await,
                        _ => {}
                    }
                }
            }
        }
        self.close().await;
        tracing::debug!("orchestrator stopped");
    }

    async fn open(&mut self, file: PathBuf) -> Result<ProjectOpenedPayload, AppError> {
        self.close().await;
        self.set(Status::Opening);

        match Session::open(&file, &self.env).await {
            Ok(session) => {
                let project = session.project().clone();
                self.session = Some(session);
                self.set(Status::Open);
                Ok(project)
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), "failed to open project: {e}");
                self.env
                    .reporter
                    .warn(&format!("failed to open {}: {e}", file.display()));
                self.set(Status::Closed);
                Err(e)
            }
        }
    }

    async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.set(Status::Closing);
        session.teardown(&self.env).await;
        self.set(Status::Closed);
    }
}

/// Control surface of a running [`Orchestrator`].
pub struct OrchestratorHandle {
    store: Store,
    status: watch::Receiver<Status>,
    requests: mpsc::UnboundedSender<Request>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    /// Open `file`, closing the current project first. Resolves once the
    /// new session is open or has failed to open.
    pub async fn open(&self, file: &Path) -> Result<ProjectOpenedPayload, AppError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Open {
                file: file.to_path_buf(),
                reply,
            })
            .map_err(|_| AppError::Stopped)?;
        rx.await.map_err(|_| AppError::Stopped)?
    }

    pub async fn close(&self) -> Result<(), AppError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Close { reply })
            .map_err(|_| AppError::Stopped)?;
        rx.await.map_err(|_| AppError::Stopped)
    }

    /// Close the current project and stop the main loop.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("orchestrator task failed: {e}");
        }
    }
}
