//! Owner-scoped task use-case service.
//!
//! # Responsibility
//! - Resolve the caller to an `OwnerId` before every operation.
//! - Encrypt notes on write and decrypt them on read.
//! - Validate input before any storage access.
//!
//! # Invariants
//! - No operation reaches the repository without a resolved owner.
//! - Missing rows and rows owned by someone else produce the same `None` /
//!   `false` outcome.
//! - Plaintext notes never reach the repository.
//! - Two concurrent updates of one row race; the last write wins.

use crate::model::task::{
    validate_title, NewTask, Task, TaskId, TaskPatch, TaskRecord, TaskValidationError, TaskView,
};
use crate::model::user::OwnerId;
use crate::repo::task_repo::{TaskChanges, TaskRepository};
use crate::repo::user_repo::UserRepository;
use crate::repo::RepoError;
use crate::security::cipher::{DecryptionError, EncryptionError, FieldCipher};
use crate::security::identity::{AuthContext, IdentityError, IdentityResolver};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Task use-case failures.
#[derive(Debug)]
pub enum StoreError {
    /// Authenticated identity has no internal user record.
    OwnerNotFound(String),
    Validation(TaskValidationError),
    /// Stored notes could not be decrypted (key mismatch or corruption).
    Decryption {
        task_id: TaskId,
        source: DecryptionError,
    },
    Encryption(EncryptionError),
    Repo(RepoError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OwnerNotFound(identity) => {
                write!(f, "no internal user for external identity `{identity}`")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Decryption { task_id, source } => {
                write!(f, "notes of task {task_id} could not be decrypted: {source}")
            }
            Self::Encryption(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::OwnerNotFound(_) => None,
            Self::Validation(err) => Some(err),
            Self::Decryption { source, .. } => Some(source),
            Self::Encryption(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<IdentityError> for StoreError {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::OwnerNotFound(identity) => Self::OwnerNotFound(identity),
            IdentityError::Repo(err) => Self::Repo(err),
        }
    }
}

impl From<TaskValidationError> for StoreError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<EncryptionError> for StoreError {
    fn from(value: EncryptionError) -> Self {
        Self::Encryption(value)
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Owner-scoped CRUD over tasks.
pub struct TaskStore<'c, T: TaskRepository, U: UserRepository> {
    tasks: T,
    identity: IdentityResolver<U>,
    cipher: &'c FieldCipher,
}

impl<'c, T: TaskRepository, U: UserRepository> TaskStore<'c, T, U> {
    pub fn new(tasks: T, users: U, cipher: &'c FieldCipher) -> Self {
        Self {
            tasks,
            identity: IdentityResolver::new(users),
            cipher,
        }
    }

    /// Creates a task owned by the caller.
    ///
    /// # Contract
    /// - Blank title fails with `Validation` before owner lookup.
    /// - Missing status becomes `pending`.
    /// - Notes are stored encrypted and returned decrypted.
    pub fn create(&self, auth: &AuthContext, input: NewTask) -> StoreResult<TaskView> {
        validate_title(&input.title)?;
        let owner = self.owner(auth)?;

        let record = TaskRecord {
            title: input.title,
            description: input.description,
            encrypted_notes: self.encrypt_optional(input.notes.as_deref())?,
            status: input.status.unwrap_or_default(),
        };
        let task = self.tasks.insert_task(owner, &record)?;
        info!(
            "event=task_create module=service status=ok owner_id={owner} task_id={}",
            task.id
        );
        self.present(task)
    }

    /// Lists the caller's tasks with notes decrypted.
    pub fn list(&self, auth: &AuthContext) -> StoreResult<Vec<TaskView>> {
        let owner = self.owner(auth)?;
        self.tasks
            .list_tasks(owner)?
            .into_iter()
            .map(|task| self.present(task))
            .collect()
    }

    /// Returns the task when it exists and belongs to the caller.
    pub fn get_by_id(&self, auth: &AuthContext, id: TaskId) -> StoreResult<Option<TaskView>> {
        let owner = self.owner(auth)?;
        self.tasks
            .get_task(owner, id)?
            .map(|task| self.present(task))
            .transpose()
    }

    /// Applies only the supplied fields; `None` when not found or not owned.
    pub fn update(
        &self,
        auth: &AuthContext,
        id: TaskId,
        patch: TaskPatch,
    ) -> StoreResult<Option<TaskView>> {
        if let Some(title) = patch.title.as_deref() {
            validate_title(title)?;
        }
        let owner = self.owner(auth)?;

        let Some(current) = self.tasks.get_task(owner, id)? else {
            return Ok(None);
        };
        if patch.is_empty() {
            return self.present(current).map(Some);
        }
        if let Some(next) = patch.status {
            current.status.validate_transition(next)?;
        }

        let changes = TaskChanges {
            title: patch.title,
            description: patch.description,
            status: patch.status,
            encrypted_notes: self.encrypt_optional(patch.notes.as_deref())?,
        };
        let updated = self.tasks.update_task(owner, id, &changes)?;
        if updated.is_some() {
            info!("event=task_update module=service status=ok owner_id={owner} task_id={id}");
        }
        updated.map(|task| self.present(task)).transpose()
    }

    /// Removes the task; `true` only when a row owned by the caller went away.
    pub fn delete(&self, auth: &AuthContext, id: TaskId) -> StoreResult<bool> {
        let owner = self.owner(auth)?;
        let removed = self.tasks.delete_task(owner, id)?;
        if removed {
            info!("event=task_delete module=service status=ok owner_id={owner} task_id={id}");
        }
        Ok(removed)
    }

    fn owner(&self, auth: &AuthContext) -> StoreResult<OwnerId> {
        Ok(self.identity.resolve_context(auth)?)
    }

    fn encrypt_optional(&self, notes: Option<&str>) -> StoreResult<Option<String>> {
        notes
            .map(|plaintext| self.cipher.encrypt(plaintext))
            .transpose()
            .map_err(StoreError::from)
    }

    fn present(&self, task: Task) -> StoreResult<TaskView> {
        let notes = match task.encrypted_notes.as_deref() {
            Some(envelope) => Some(self.cipher.decrypt(envelope).map_err(|source| {
                error!(
                    "event=notes_decrypt module=service status=error task_id={} error={}",
                    task.id, source
                );
                StoreError::Decryption {
                    task_id: task.id,
                    source,
                }
            })?),
            None => None,
        };

        Ok(TaskView {
            id: task.id,
            title: task.title,
            description: task.description,
            notes,
            status: task.status,
            owner_id: task.owner_id,
            created_at: task.created_at,
            updated_at: task.updated_at,
        })
    }
}
