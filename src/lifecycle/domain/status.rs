//! Task workflow states and the append-only transition log.

use super::ParseTaskStatusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow state of a task on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task exists but nobody has picked it up.
    Unassigned,
    /// Task is queued for work.
    Todo,
    /// Task is being worked on.
    InProgress,
    /// Task has been finished.
    Completed,
}

impl TaskStatus {
    /// Every status in board order.
    pub const ALL: [Self; 4] = [
        Self::Unassigned,
        Self::Todo,
        Self::InProgress,
        Self::Completed,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Returns whether the status counts as actively in flight.
    ///
    /// Cycle time starts at the first status that is not `Unassigned`.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        !matches!(self, Self::Unassigned)
    }

    /// Returns whether a generic transition may move from `self` to `target`.
    ///
    /// Movement between open states is free. A move to the same state is a
    /// no-op and leaving `Completed` requires a reopen.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self != Self::Completed && self != target
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "unassigned" => Ok(Self::Unassigned),
            "todo" | "to_do" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::try_from(value)
    }
}

/// A single recorded status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEntry {
    /// Status entered.
    pub status: TaskStatus,
    /// When the status was entered.
    pub occurred_at: DateTime<Utc>,
}

/// Append-only history of a task's status changes.
///
/// The log is never empty: it always opens with the creation status.
/// Timestamps are non-decreasing; an entry recorded with an earlier clock
/// reading than its predecessor is clamped to the predecessor's timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TransitionEntry>", into = "Vec<TransitionEntry>")]
pub struct TransitionLog {
    first: TransitionEntry,
    rest: Vec<TransitionEntry>,
}

/// Error returned when reconstructing a log that violates its invariants.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransitionLogError {
    /// A log must contain the creation entry.
    #[error("transition log is empty")]
    Empty,
    /// Entries are out of chronological order.
    #[error("transition log entry {index} is earlier than its predecessor")]
    OutOfOrder {
        /// Zero-based position of the offending entry.
        index: usize,
    },
}

#[expect(
    clippy::len_without_is_empty,
    reason = "a transition log always holds its initial entry"
)]
impl TransitionLog {
    /// Starts a log with the creation entry.
    #[must_use]
    pub const fn start(status: TaskStatus, occurred_at: DateTime<Utc>) -> Self {
        Self {
            first: TransitionEntry {
                status,
                occurred_at,
            },
            rest: Vec::new(),
        }
    }

    /// Appends an entry, returning the entry actually recorded.
    pub fn append(&mut self, status: TaskStatus, occurred_at: DateTime<Utc>) -> TransitionEntry {
        let previous = self.last().occurred_at;
        let entry = TransitionEntry {
            status,
            occurred_at: occurred_at.max(previous),
        };
        self.rest.push(entry);
        entry
    }

    /// Returns the most recent entry.
    #[must_use]
    pub fn last(&self) -> &TransitionEntry {
        self.rest.last().unwrap_or(&self.first)
    }

    /// Returns the creation entry.
    #[must_use]
    pub const fn first(&self) -> &TransitionEntry {
        &self.first
    }

    /// Iterates entries in recorded order.
    pub fn iter(&self) -> impl Iterator<Item = &TransitionEntry> {
        std::iter::once(&self.first).chain(self.rest.iter())
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rest.len() + 1
    }

    /// Returns the first time the task entered an in-flight status.
    #[must_use]
    pub fn first_in_flight(&self) -> Option<DateTime<Utc>> {
        self.iter()
            .find(|entry| entry.status.is_in_flight())
            .map(|entry| entry.occurred_at)
    }

    /// Returns the first time the task was completed.
    #[must_use]
    pub fn first_completion(&self) -> Option<DateTime<Utc>> {
        self.iter()
            .find(|entry| entry.status == TaskStatus::Completed)
            .map(|entry| entry.occurred_at)
    }
}

impl TryFrom<Vec<TransitionEntry>> for TransitionLog {
    type Error = TransitionLogError;

    fn try_from(entries: Vec<TransitionEntry>) -> Result<Self, Self::Error> {
        let mut iter = entries.into_iter();
        let first = iter.next().ok_or(TransitionLogError::Empty)?;
        let rest: Vec<TransitionEntry> = iter.collect();

        let mut previous = first.occurred_at;
        for (offset, entry) in rest.iter().enumerate() {
            if entry.occurred_at < previous {
                return Err(TransitionLogError::OutOfOrder { index: offset + 1 });
            }
            previous = entry.occurred_at;
        }

        Ok(Self { first, rest })
    }
}

impl From<TransitionLog> for Vec<TransitionEntry> {
    fn from(log: TransitionLog) -> Self {
        let mut entries = Vec::with_capacity(log.len());
        entries.push(log.first);
        entries.extend(log.rest);
        entries
    }
}

impl<'a> IntoIterator for &'a TransitionLog {
    type Item = &'a TransitionEntry;
    type IntoIter = std::iter::Chain<
        std::iter::Once<&'a TransitionEntry>,
        std::slice::Iter<'a, TransitionEntry>,
    >;

    fn into_iter(self) -> Self::IntoIter {
        std::iter::once(&self.first).chain(self.rest.iter())
    }
}
