//! Task domain model.
//!
//! # Responsibility
//! - Define the persisted task record and its decrypted presentation view.
//! - Own title/status validation shared by create and update paths.
//!
//! # Invariants
//! - `title` is never empty or whitespace-only.
//! - Status only moves forward: `pending -> in_progress -> completed`,
//!   with `pending -> completed` allowed as a shortcut.

use super::user::OwnerId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Autoincrement primary key of a task row.
pub type TaskId = i64;

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not started.
    #[default]
    Pending,
    /// Work is in progress.
    InProgress,
    /// Finished.
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [Self::Pending, Self::InProgress, Self::Completed];

    /// Stable string id used in storage and JSON payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
        }
    }

    /// Checks that a stored status may be replaced by `next`.
    ///
    /// Same-state writes are accepted so partial updates can echo the
    /// current status back.
    pub fn validate_transition(self, next: TaskStatus) -> Result<(), TaskValidationError> {
        if next.rank() >= self.rank() {
            return Ok(());
        }
        Err(TaskValidationError::InvalidTransition {
            from: self,
            to: next,
        })
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation failures raised before any storage access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    EmptyTitle,
    InvalidTransition { from: TaskStatus, to: TaskStatus },
}

impl TaskValidationError {
    /// Request field the failure refers to.
    pub fn field(&self) -> &'static str {
        match self {
            Self::EmptyTitle => "title",
            Self::InvalidTransition { .. } => "status",
        }
    }
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "Title is required"),
            Self::InvalidTransition { from, to } => {
                write!(f, "status cannot move from {from} to {to}")
            }
        }
    }
}

impl Error for TaskValidationError {}

/// Persisted task row. `encrypted_notes` holds ciphertext only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub encrypted_notes: Option<String>,
    pub status: TaskStatus,
    /// `None` once the owning user row has been removed.
    pub owner_id: Option<OwnerId>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

/// Insert payload handed to the repository after encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub title: String,
    pub description: Option<String>,
    pub encrypted_notes: Option<String>,
    pub status: TaskStatus,
}

/// Caller input for creating a task. `notes` is plaintext here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub notes: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub notes: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.notes.is_none()
    }
}

/// Decrypted presentation of a task returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub status: TaskStatus,
    pub owner_id: Option<OwnerId>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Rejects empty or whitespace-only titles.
pub fn validate_title(title: &str) -> Result<(), TaskValidationError> {
    if title.trim().is_empty() {
        return Err(TaskValidationError::EmptyTitle);
    }
    Ok(())
}
