//! Undoable command engine and project orchestration for a photo archive.
//!
//! Every change to a project starts as an [`action::Action`] dispatched
//! through the [`store::Store`]. Command-bearing actions are executed by a
//! [`command::Command`] looked up in the process [`command::Registry`];
//! reversible outcomes land in the [`history::HistoryStack`]. The
//! [`saga::Orchestrator`] owns the single open project and the listeners
//! bound to it.

pub mod action;
pub mod command;
pub mod db;
pub mod error;
pub mod history;
pub mod image;
pub mod logging;
pub mod model;
pub mod nav;
pub mod paths;
pub mod progress;
pub mod prompt;
pub mod report;
pub mod saga;
pub mod settings;
pub mod state;
pub mod store;
pub mod task;
pub mod util;

#[cfg(test)]
mod testing;
