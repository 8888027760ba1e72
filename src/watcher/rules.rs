//! Rule table and directory resolution.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::events::EventKind;
use super::filter::FilenameFilter;
use crate::config::RuleConfig;

/// How many rules handle an event when several claim its directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPolicy {
    /// Only the first rule in declaration order.
    #[default]
    First,
    /// Every claiming rule, each evaluated independently.
    All,
}

/// A watch rule, immutable once loaded.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub directories: Vec<PathBuf>,
    pub event_kinds: HashSet<EventKind>,
    pub filenames: FilenameFilter,
    pub command_template: String,
}

impl Rule {
    #[must_use]
    pub fn from_config(index: usize, config: &RuleConfig) -> Self {
        Self {
            name: config.label(index),
            directories: config.dirs.clone(),
            event_kinds: config.events.iter().copied().collect(),
            filenames: FilenameFilter::new(&config.matches),
            command_template: config.exec.clone(),
        }
    }

    #[must_use]
    pub fn accepts(&self, kind: EventKind) -> bool {
        self.event_kinds.contains(&kind)
    }
}

/// Directory to rules index, read-only after construction.
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: Vec<Rule>,
    by_dir: HashMap<PathBuf, Vec<usize>>,
    policy: ResolutionPolicy,
}

impl RuleStore {
    #[must_use]
    pub fn new(rules: Vec<Rule>, policy: ResolutionPolicy) -> Self {
        let mut by_dir: HashMap<PathBuf, Vec<usize>> = HashMap::new();
        for (index, rule) in rules.iter().enumerate() {
            for dir in &rule.directories {
                let claimants = by_dir.entry(dir.clone()).or_default();
                if !claimants.contains(&index) {
                    claimants.push(index);
                }
            }
        }

        for (dir, claimants) in &by_dir {
            if claimants.len() > 1 && policy == ResolutionPolicy::First {
                tracing::warn!(
                    dir = %dir.display(),
                    rules = claimants.len(),
                    "Directory claimed by several rules, only the first will run"
                );
            }
        }

        Self {
            rules,
            by_dir,
            policy,
        }
    }

    #[must_use]
    pub fn from_configs(configs: &[RuleConfig], policy: ResolutionPolicy) -> Self {
        let rules = configs
            .iter()
            .enumerate()
            .map(|(i, c)| Rule::from_config(i, c))
            .collect();
        Self::new(rules, policy)
    }

    /// Rules owning the parent directory of `path`.
    ///
    /// The parent is matched exactly against configured directories; a file
    /// in a subdirectory of a watched directory resolves to nothing.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> Vec<&Rule> {
        let Some(claimants) = path.parent().and_then(|dir| self.by_dir.get(dir)) else {
            return Vec::new();
        };

        let take = match self.policy {
            ResolutionPolicy::First => 1,
            ResolutionPolicy::All => claimants.len(),
        };

        claimants
            .iter()
            .take(take)
            .map(|&index| &self.rules[index])
            .collect()
    }

    #[must_use]
    pub const fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
