//! Event dispatch: rule resolution, filtering, rendering and execution.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::events::{EventKind, RawEvent};
use super::exec::{ExecReport, Executor, Invocation};
use super::render::{CommandRenderer, DispatchContext, Vars};
use super::rules::{Rule, RuleStore};

/// Counters for dispatch outcomes.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub events_received: AtomicU64,
    pub dropped_no_rule: AtomicU64,
    pub dropped_kind: AtomicU64,
    pub dropped_filename: AtomicU64,
    pub glob_errors: AtomicU64,
    pub render_errors: AtomicU64,
    pub executed: AtomicU64,
    pub exec_failures: AtomicU64,
}

impl DispatchStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            dropped_no_rule: self.dropped_no_rule.load(Ordering::Relaxed),
            dropped_kind: self.dropped_kind.load(Ordering::Relaxed),
            dropped_filename: self.dropped_filename.load(Ordering::Relaxed),
            glob_errors: self.glob_errors.load(Ordering::Relaxed),
            render_errors: self.render_errors.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            exec_failures: self.exec_failures.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::NoRule => &self.dropped_no_rule,
            DispatchOutcome::KindFiltered { .. } => &self.dropped_kind,
            DispatchOutcome::FilenameFiltered { .. } => &self.dropped_filename,
            DispatchOutcome::GlobError { .. } => &self.glob_errors,
            DispatchOutcome::RenderError { .. } => &self.render_errors,
            DispatchOutcome::Executed { .. } => &self.executed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of dispatch stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    pub events_received: u64,
    pub dropped_no_rule: u64,
    pub dropped_kind: u64,
    pub dropped_filename: u64,
    pub glob_errors: u64,
    pub render_errors: u64,
    pub executed: u64,
    pub exec_failures: u64,
}

/// Terminal state of one rule's pipeline for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No rule claims the event's directory.
    NoRule,
    /// The rule does not react to this event kind.
    KindFiltered { rule: String, kind: EventKind },
    /// No filename pattern of the rule matched.
    FilenameFiltered { rule: String },
    /// A malformed pattern was reached while matching.
    GlobError { rule: String },
    /// The command template failed to render.
    RenderError { rule: String },
    /// The command was launched. Holds the rendered command; the command's
    /// own exit status does not change the outcome.
    Executed { rule: String, command: String },
}

impl DispatchOutcome {
    #[must_use]
    pub const fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }
}

/// Result of one pipeline stage: carry on with a value, or stop.
enum Stage<T> {
    Next(T),
    Halt(DispatchOutcome),
}

/// Applies rules to raw events and launches the resulting commands.
pub struct Dispatcher {
    rules: Arc<RuleStore>,
    vars: Arc<Vars>,
    renderer: CommandRenderer,
    executor: Arc<dyn Executor>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(rules: Arc<RuleStore>, vars: Arc<Vars>, executor: Arc<dyn Executor>) -> Self {
        let renderer = CommandRenderer::new();
        for rule in rules.rules() {
            if let Err(e) = renderer.validate(&rule.command_template) {
                tracing::warn!(rule = %rule.name, error = %e, "Command template does not parse");
            }
        }

        Self {
            rules,
            vars,
            renderer,
            executor,
            stats: DispatchStats::new(),
        }
    }

    /// Run one event through every rule that owns its directory.
    ///
    /// Never fails: filtered events and per-event errors are logged and
    /// reported as outcomes.
    pub async fn dispatch(&self, event: &RawEvent) -> Vec<DispatchOutcome> {
        self.stats.events_received.fetch_add(1, Ordering::Relaxed);

        let rules = self.rules.resolve(&event.path);
        if rules.is_empty() {
            tracing::debug!(
                event = %event.op,
                file_name = %event.path.display(),
                "no watcher found for event"
            );
            let outcome = DispatchOutcome::NoRule;
            self.stats.record(&outcome);
            return vec![outcome];
        }

        let kind = EventKind::classify(event.op);
        let mut outcomes = Vec::with_capacity(rules.len());
        for rule in rules {
            let outcome = self.run_rule(rule, kind, &event.path).await;
            self.stats.record(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_rule(&self, rule: &Rule, kind: EventKind, path: &Path) -> DispatchOutcome {
        let command = match Self::filter_kind(rule, kind, path)
            .and_then(|()| Self::filter_filename(rule, path))
            .and_then(|()| self.render(rule, path))
        {
            Stage::Next(command) => command,
            Stage::Halt(outcome) => return outcome,
        };

        let invocation = Invocation {
            rule: rule.name.clone(),
            path: path.to_path_buf(),
            command: command.clone(),
        };

        match self.executor.execute(invocation).await {
            Ok(ExecReport::Completed) => {
                tracing::debug!(rule = %rule.name, %command, "Command finished");
            }
            Ok(ExecReport::Submitted) => {
                tracing::debug!(rule = %rule.name, %command, "Command submitted");
            }
            Err(e) => {
                self.stats.exec_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(rule = %rule.name, error = %e, "failed to run command");
            }
        }

        DispatchOutcome::Executed {
            rule: rule.name.clone(),
            command,
        }
    }

    fn filter_kind(rule: &Rule, kind: EventKind, path: &Path) -> Stage<()> {
        if rule.accepts(kind) {
            return Stage::Next(());
        }

        tracing::debug!(
            rule = %rule.name,
            event = %kind,
            file_name = %path.display(),
            "event kind not handled by watcher"
        );
        Stage::Halt(DispatchOutcome::KindFiltered {
            rule: rule.name.clone(),
            kind,
        })
    }

    fn filter_filename(rule: &Rule, path: &Path) -> Stage<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        match rule.filenames.first_match(&name) {
            Ok(Some(_)) => Stage::Next(()),
            Ok(None) => {
                tracing::debug!(
                    rule = %rule.name,
                    file_name = %path.display(),
                    "no file match found for event"
                );
                Stage::Halt(DispatchOutcome::FilenameFiltered {
                    rule: rule.name.clone(),
                })
            }
            Err(e) => {
                tracing::error!(rule = %rule.name, error = %e, "failed to match");
                Stage::Halt(DispatchOutcome::GlobError {
                    rule: rule.name.clone(),
                })
            }
        }
    }

    fn render(&self, rule: &Rule, path: &Path) -> Stage<String> {
        let ctx = DispatchContext {
            path: path.to_string_lossy(),
            vars: &self.vars,
        };

        match self.renderer.render(&rule.command_template, &ctx) {
            Ok(command) => Stage::Next(command),
            Err(e) => {
                tracing::error!(rule = %rule.name, error = %e, "failed to render command");
                Stage::Halt(DispatchOutcome::RenderError {
                    rule: rule.name.clone(),
                })
            }
        }
    }

    /// Get current stats.
    #[must_use]
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }
}

impl<T> Stage<T> {
    fn and_then<U>(self, f: impl FnOnce(T) -> Stage<U>) -> Stage<U> {
        match self {
            Self::Next(value) => f(value),
            Self::Halt(outcome) => Stage::Halt(outcome),
        }
    }
}
