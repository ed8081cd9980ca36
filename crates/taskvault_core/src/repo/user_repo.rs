//! User repository: identity lookups plus out-of-band provisioning.

use super::{RepoError, RepoResult};
use crate::model::user::{NewUser, OwnerId, User, UserRole};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

const USER_SELECT_SQL: &str = "SELECT
    id,
    external_identity,
    email,
    role,
    created_at,
    updated_at
FROM users";

/// Read access used by identity resolution, plus provisioning for operators.
pub trait UserRepository {
    fn find_by_external_identity(&self, external_identity: &str) -> RepoResult<Option<User>>;

    /// Provisions a user record. Not reachable from the request path.
    fn insert_user(&self, user: &NewUser) -> RepoResult<User>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn find_by_external_identity(&self, external_identity: &str) -> RepoResult<Option<User>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{USER_SELECT_SQL} WHERE external_identity = ?1;"
        ))?;
        let row = stmt
            .query_row([external_identity], |row| Ok(read_user_columns(row)))
            .optional()?;
        row.transpose()
    }

    fn insert_user(&self, user: &NewUser) -> RepoResult<User> {
        let result = self.conn.query_row(
            "INSERT INTO users (external_identity, email, role)
             VALUES (?1, ?2, ?3)
             RETURNING id, external_identity, email, role, created_at, updated_at;",
            params![
                user.external_identity.as_str(),
                user.email.as_str(),
                user.role.as_str(),
            ],
            |row| Ok(read_user_columns(row)),
        );

        match result {
            Ok(parsed) => parsed,
            Err(err) if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                Err(RepoError::Conflict(format!(
                    "external identity `{}` is already provisioned",
                    user.external_identity
                )))
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn read_user_columns(row: &Row<'_>) -> RepoResult<User> {
    let role_text: String = row.get("role")?;
    let role = UserRole::parse(&role_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid role `{role_text}` in users.role"))
    })?;

    Ok(User {
        id: OwnerId::new(row.get("id")?),
        external_identity: row.get("external_identity")?,
        email: row.get("email")?,
        role,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
