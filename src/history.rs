//! Linear undo/redo log of reversible command outcomes.
//!
//! The stack never executes anything itself: [`HistoryStack::undo`] and
//! [`HistoryStack::redo`] hand back the action to dispatch, and the history
//! listener puts it through the normal pipeline.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::action::{Action, HistoryMode};
use crate::settings::DEFAULT_HISTORY_LIMIT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HistoryEntry {
    pub undo: Action,
    pub redo: Action,
    #[serde(default)]
    pub mode: HistoryMode,
}

/// Undo/redo state for the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UndoState {
    pub can_undo: bool,
    pub can_redo: bool,
    /// Entries below the cursor.
    pub past: usize,
    /// Entries at or above the cursor.
    pub future: usize,
    pub undo_description: Option<String>,
    pub redo_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HistoryStack {
    entries: Vec<HistoryEntry>,
    /// Always within `0..=entries.len()`.
    cursor: usize,
    limit: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryStack {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            limit: limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Record an outcome. Entries above the cursor are discarded first.
    ///
    /// A merge entry coalesces into the entry below the cursor: that entry keeps
    /// its `undo` and takes the new `redo`. The result stays a merge target, so
    /// a run of merges collapses into one step. With nothing below the cursor a
    /// merge is recorded as a tick.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.truncate(self.cursor);

        if entry.mode == HistoryMode::Merge {
            if let Some(last) = self.entries.last_mut() {
                last.redo = entry.redo;
                return;
            }
        }

        self.entries.push(entry);
        if self.entries.len() > self.limit {
            self.entries.remove(0);
        }
        self.cursor = self.entries.len();
    }

    /// The action that reverts the step below the cursor, moving the cursor down.
    pub fn undo(&mut self) -> Option<Action> {
        if self.cursor == 0 {
            tracing::warn!("nothing to undo");
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).map(|e| e.undo.for_replay())
    }

    /// The action that replays the step at the cursor, moving the cursor up.
    pub fn redo(&mut self) -> Option<Action> {
        let Some(entry) = self.entries.get(self.cursor) else {
            tracing::warn!("nothing to redo");
            return None;
        };
        let action = entry.redo.for_replay();
        self.cursor += 1;
        Some(action)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub fn state(&self) -> UndoState {
        let below = self.cursor.checked_sub(1).and_then(|i| self.entries.get(i));
        let at = self.entries.get(self.cursor);
        UndoState {
            can_undo: below.is_some(),
            can_redo: at.is_some(),
            past: self.cursor,
            future: self.entries.len() - self.cursor,
            undo_description: below.map(|e| e.undo.kind.to_string()),
            redo_description: at.map(|e| e.redo.kind.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::action::ActionType;

    fn entry(n: i64, mode: HistoryMode) -> HistoryEntry {
        HistoryEntry {
            undo: Action::new(ActionType::ItemDelete, serde_json::json!({ "undo": n })),
            redo: Action::new(ActionType::ItemRestore, serde_json::json!({ "redo": n })),
            mode,
        }
    }

    fn payloads(stack: &HistoryStack) -> Vec<i64> {
        stack
            .entries()
            .iter()
            .map(|e| e.redo.payload["redo"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn undo_and_redo_move_the_cursor() {
        let mut stack = HistoryStack::default();
        stack.record(entry(1, HistoryMode::Tick));
        stack.record(entry(2, HistoryMode::Tick));

        let undo = stack.undo().unwrap();
        assert_eq!(undo.payload["undo"], 2);
        assert_eq!(stack.cursor(), 1);
        let redo = stack.redo().unwrap();
        assert_eq!(redo.payload["redo"], 2);
        assert_eq!(stack.cursor(), 2);
        assert!(stack.redo().is_none());
        assert_eq!(stack.cursor(), 2);
    }

    #[test]
    fn undo_at_bottom_is_a_no_op() {
        let mut stack = HistoryStack::default();
        assert!(stack.undo().is_none());
        assert_eq!(stack.cursor(), 0);
        assert!(!stack.state().can_undo);
    }

    #[test]
    fn tick_after_undo_discards_the_future() {
        let mut stack = HistoryStack::default();
        for n in 1..=3 {
            stack.record(entry(n, HistoryMode::Tick));
        }
        stack.undo();
        stack.record(entry(4, HistoryMode::Tick));
        assert_eq!(payloads(&stack), vec![1, 2, 4]);
        assert_eq!(stack.cursor(), 3);
        assert!(!stack.state().can_redo);
    }

    #[test]
    fn merge_keeps_first_undo_and_last_redo() {
        let mut stack = HistoryStack::default();
        stack.record(entry(1, HistoryMode::Tick));
        stack.record(entry(2, HistoryMode::Merge));
        stack.record(entry(3, HistoryMode::Merge));
        assert_eq!(stack.len(), 1);
        let only = &stack.entries()[0];
        assert_eq!(only.undo.payload["undo"], 1);
        assert_eq!(only.redo.payload["redo"], 3);
        assert_eq!(only.mode, HistoryMode::Tick);
    }

    #[test]
    fn merge_on_empty_stack_ticks() {
        let mut stack = HistoryStack::default();
        stack.record(entry(1, HistoryMode::Merge));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.cursor(), 1);
    }

    #[test]
    fn merge_after_undo_truncates_then_coalesces() {
        let mut stack = HistoryStack::default();
        stack.record(entry(1, HistoryMode::Tick));
        stack.record(entry(2, HistoryMode::Tick));
        stack.undo();
        stack.record(entry(3, HistoryMode::Merge));
        assert_eq!(payloads(&stack), vec![3]);
        assert_eq!(stack.entries()[0].undo.payload["undo"], 1);
        assert_eq!(stack.cursor(), 1);
    }

    #[test]
    fn limit_drops_oldest() {
        let mut stack = HistoryStack::new(2);
        for n in 1..=3 {
            stack.record(entry(n, HistoryMode::Tick));
        }
        assert_eq!(payloads(&stack), vec![2, 3]);
        assert_eq!(stack.cursor(), 2);
    }

    #[test]
    fn replayed_actions_never_rerecord() {
        let mut stack = HistoryStack::default();
        let mut e = entry(1, HistoryMode::Tick);
        e.undo.meta.history = Some(HistoryMode::Tick);
        e.undo.meta.seq = Some(4);
        stack.record(e);
        let undo = stack.undo().unwrap();
        assert_eq!(undo.meta.history, None);
        assert_eq!(undo.meta.seq, None);
    }

    #[test]
    fn state_describes_both_directions() {
        let mut stack = HistoryStack::default();
        stack.record(entry(1, HistoryMode::Tick));
        stack.record(entry(2, HistoryMode::Tick));
        stack.undo();
        let state = stack.state();
        assert_eq!(state.past, 1);
        assert_eq!(state.future, 1);
        assert_eq!(state.undo_description.as_deref(), Some("item.delete"));
        assert_eq!(state.redo_description.as_deref(), Some("item.restore"));
    }
}
