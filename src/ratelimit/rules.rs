//! Rate limit rules configuration and lookup.
//!
//! A [`RuleTable`] maps notification categories to a sliding-window [`Rule`].
//! It is built once at startup and only read afterwards. Categories without a
//! rule are unlimited.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{QuotaError, Result};

/// A sliding-window limit: at most `limit` admissions per trailing `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    limit: usize,
    interval: Duration,
}

impl Rule {
    /// Create a rule, rejecting a zero limit or a zero interval.
    pub fn new(limit: usize, interval: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(QuotaError::InvalidLimit("limit must be positive".to_string()));
        }
        if interval.is_zero() {
            return Err(QuotaError::InvalidLimit("interval must be positive".to_string()));
        }
        Ok(Self { limit, interval })
    }

    /// Maximum admissions within one interval.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Length of the trailing window.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// On-disk form of a single rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// The category this rule applies to (exact match)
    pub category: String,
    /// Notifications allowed per interval
    pub limit: usize,
    /// Interval length in seconds
    pub interval_secs: u64,
}

/// On-disk form of a rules file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Immutable mapping from category name to [`Rule`].
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, Rule>,
}

impl RuleTable {
    /// Build a table from a caller-supplied mapping.
    pub fn new(rules: HashMap<String, Rule>) -> Self {
        Self { rules }
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    ///
    /// A category may appear only once.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: RulesFile = serde_yaml::from_str(yaml)
            .map_err(|e| QuotaError::Config(format!("Failed to parse rate limit rules: {}", e)))?;

        let mut rules = HashMap::with_capacity(file.rules.len());
        for entry in file.rules {
            let rule = Rule::new(entry.limit, Duration::from_secs(entry.interval_secs))
                .map_err(|e| match e {
                    QuotaError::InvalidLimit(reason) => QuotaError::InvalidRule {
                        category: entry.category.clone(),
                        reason,
                    },
                    other => other,
                })?;

            if rules.insert(entry.category.clone(), rule).is_some() {
                return Err(QuotaError::Config(format!(
                    "Duplicate rule for category {}",
                    entry.category
                )));
            }
        }

        info!(rules = rules.len(), "Rate limit rules loaded");
        Ok(Self { rules })
    }

    /// The rule for `category`, if it is rate limited.
    pub fn rule_for(&self, category: &str) -> Option<Rule> {
        self.rules.get(category).copied()
    }

    /// Rate limited categories, in no particular order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<(String, Rule)> for RuleTable {
    fn from_iter<I: IntoIterator<Item = (String, Rule)>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
