use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::action::ActionType;

/// Progress of a batch command, emitted once per processed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProgressEvent {
    /// Sequence id of the command reporting progress.
    pub seq: Option<u64>,
    pub kind: ActionType,
    pub total: usize,
    pub progress: usize,
}
