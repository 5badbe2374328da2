use crate::action::ActionType;
use crate::error::CommandError;

/// Fire-and-forget sink for user-facing warnings and failures.
pub trait Reporter: Send + Sync {
    fn warn(&self, message: &str);
    fn fail(&self, error: &CommandError, kind: ActionType);
}

/// Reports through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn fail(&self, error: &CommandError, kind: ActionType) {
        tracing::error!(action = %kind, "{error}");
    }
}
