//! Owner-scoped task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over `tasks` that always filter by owner.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Every statement binds `owner_id`; a row owned by someone else behaves
//!   exactly like a missing row.
//! - Notes arrive here already encrypted; this layer never sees plaintext.

use super::{RepoError, RepoResult};
use crate::model::task::{Task, TaskId, TaskRecord, TaskStatus};
use crate::model::user::OwnerId;
use rusqlite::{params, Connection, OptionalExtension, Row};

const TASK_COLUMNS: &str = "id,
    title,
    description,
    encrypted_notes,
    status,
    owner_id,
    created_at,
    updated_at";

/// Column-level changes for an update. Ciphertext only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub encrypted_notes: Option<String>,
}

/// Repository interface for owner-scoped task CRUD.
pub trait TaskRepository {
    fn insert_task(&self, owner: OwnerId, record: &TaskRecord) -> RepoResult<Task>;
    fn list_tasks(&self, owner: OwnerId) -> RepoResult<Vec<Task>>;
    fn get_task(&self, owner: OwnerId, id: TaskId) -> RepoResult<Option<Task>>;
    /// Returns `None` when no row with `id` belongs to `owner`.
    fn update_task(
        &self,
        owner: OwnerId,
        id: TaskId,
        changes: &TaskChanges,
    ) -> RepoResult<Option<Task>>;
    /// Returns whether a row was removed.
    fn delete_task(&self, owner: OwnerId, id: TaskId) -> RepoResult<bool>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn insert_task(&self, owner: OwnerId, record: &TaskRecord) -> RepoResult<Task> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "INSERT INTO tasks (title, description, encrypted_notes, status, owner_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING {TASK_COLUMNS};"
        ))?;
        stmt.query_row(
            params![
                record.title.as_str(),
                record.description.as_deref(),
                record.encrypted_notes.as_deref(),
                record.status.as_str(),
                owner.get(),
            ],
            |row| Ok(parse_task_row(row)),
        )?
    }

    fn list_tasks(&self, owner: OwnerId) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ?1 ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([owner.get()])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn get_task(&self, owner: OwnerId, id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND owner_id = ?2;"
        ))?;
        stmt.query_row(params![id, owner.get()], |row| Ok(parse_task_row(row)))
            .optional()?
            .transpose()
    }

    fn update_task(
        &self,
        owner: OwnerId,
        id: TaskId,
        changes: &TaskChanges,
    ) -> RepoResult<Option<Task>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "UPDATE tasks
             SET
                title = COALESCE(?1, title),
                description = COALESCE(?2, description),
                status = COALESCE(?3, status),
                encrypted_notes = COALESCE(?4, encrypted_notes),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?5 AND owner_id = ?6
             RETURNING {TASK_COLUMNS};"
        ))?;
        stmt.query_row(
            params![
                changes.title.as_deref(),
                changes.description.as_deref(),
                changes.status.map(TaskStatus::as_str),
                changes.encrypted_notes.as_deref(),
                id,
                owner.get(),
            ],
            |row| Ok(parse_task_row(row)),
        )
        .optional()?
        .transpose()
    }

    fn delete_task(&self, owner: OwnerId, id: TaskId) -> RepoResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND owner_id = ?2;",
            params![id, owner.get()],
        )?;
        Ok(removed > 0)
    }
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let status_text: String = row.get("status")?;
    let status = TaskStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid task status `{status_text}` in tasks.status"))
    })?;

    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        encrypted_notes: row.get("encrypted_notes")?,
        status,
        owner_id: row.get::<_, Option<i64>>("owner_id")?.map(OwnerId::new),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
