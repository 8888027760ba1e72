//! File system watching and command dispatch.
//!
//! This module provides:
//! - Directory subscription using notify-rs
//! - Event classification and rule resolution
//! - Filename glob filtering
//! - Command template rendering and execution

mod dispatcher;
mod events;
mod exec;
mod filter;
mod render;
mod rules;
mod watch_loop;
#[allow(clippy::module_inception)]
mod watcher;

pub use dispatcher::{DispatchOutcome, DispatchStats, DispatchStatsSnapshot, Dispatcher};
pub use events::{EventKind, OpMask, RawEvent};
pub use exec::{
    executor_for, ExecReport, ExecutionMode, Executor, InlineExecutor, Invocation,
    PooledExecutor, ShellCommand,
};
pub use filter::FilenameFilter;
pub use render::{CommandRenderer, DispatchContext, Vars};
pub use rules::{ResolutionPolicy, Rule, RuleStore};
pub use watch_loop::WatchLoop;
pub use watcher::{EventSender, EventStream, FileWatcher, WatchConfig};
