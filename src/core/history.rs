//! Transition records and history tracking.
//!
//! Every move a machine makes between its children is described by a
//! [`TransitionRecord`]; entering a machine is a move from no child to the
//! start child, and exiting is a move from the current child to none.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Record of a single move between sibling states.
///
/// `from: None` marks a hierarchical entry and `to: None` a hierarchical exit.
///
/// # Example
///
/// ```rust
/// use stratum::core::TransitionRecord;
///
/// let entry = TransitionRecord::new(None, Some("a".to_string()));
/// assert!(entry.is_entry());
/// assert!(!entry.is_exit());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The child being left
    pub from: Option<String>,
    /// The child being entered
    pub to: Option<String>,
    /// When the move happened
    pub timestamp: DateTime<Utc>,
}

impl TransitionRecord {
    pub fn new(from: Option<String>, to: Option<String>) -> Self {
        Self {
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    pub fn is_entry(&self) -> bool {
        self.from.is_none() && self.to.is_some()
    }

    pub fn is_exit(&self) -> bool {
        self.to.is_none()
    }
}

/// Ordered history of transition records.
///
/// History is immutable - the `record` method returns a new history
/// with the record added. A history created with
/// [`with_limit`](Self::with_limit) keeps only its most recent records.
///
/// # Example
///
/// ```rust
/// use stratum::core::{StateHistory, TransitionRecord};
///
/// let history = StateHistory::new()
///     .record(TransitionRecord::new(None, Some("a".to_string())))
///     .record(TransitionRecord::new(Some("a".to_string()), Some("b".to_string())));
///
/// assert_eq!(history.get_path(), vec!["a", "b"]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateHistory {
    records: VecDeque<TransitionRecord>,
    #[serde(default)]
    limit: Option<usize>,
}

impl StateHistory {
    /// Create a new empty history.
    pub fn new() -> Self {
        Self {
            records: VecDeque::new(),
            limit: None,
        }
    }

    /// Create an empty history that drops its oldest record once it holds
    /// `limit` records.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit: Some(limit),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Record a transition, returning a new history.
    ///
    /// The existing history is left untouched.
    ///
    /// ```rust
    /// use stratum::core::{StateHistory, TransitionRecord};
    ///
    /// let history = StateHistory::new();
    /// let updated = history.record(TransitionRecord::new(None, Some("a".to_string())));
    ///
    /// assert_eq!(updated.records().len(), 1);
    /// assert_eq!(history.records().len(), 0);
    /// ```
    pub fn record(&self, record: TransitionRecord) -> Self {
        let mut history = self.clone();
        history.push(record);
        history
    }

    /// Append in place, dropping the oldest records beyond the limit.
    pub(crate) fn push(&mut self, record: TransitionRecord) {
        self.records.push_back(record);
        if let Some(limit) = self.limit {
            while self.records.len() > limit {
                self.records.pop_front();
            }
        }
    }

    /// Names of the children visited, in order.
    ///
    /// Starts with the `from` of the first record (when there is one), then
    /// the `to` of every record. Hierarchical exits contribute nothing.
    pub fn get_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        if let Some(from) = self.records.front().and_then(|r| r.from.as_deref()) {
            path.push(from);
        }
        for record in &self.records {
            if let Some(to) = record.to.as_deref() {
                path.push(to);
            }
        }
        path
    }

    /// Time between the first and last record.
    ///
    /// Returns `None` if there are no records.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.records.front(), self.records.back()) {
            let duration = last.timestamp.signed_duration_since(first.timestamp);
            duration.to_std().ok()
        } else {
            None
        }
    }

    /// All records, oldest first.
    pub fn records(&self) -> impl ExactSizeIterator<Item = &TransitionRecord> + '_ {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
