//! Postgres persistence for accounts and project records.

use sqlx::error::Error as SqlxError;

pub mod projects;
pub mod users;

pub use projects::Project;
pub use users::User;

/// Unique-constraint violation, SQLSTATE 23505.
pub(crate) fn is_unique_violation(err: &SqlxError) -> bool {
    matches!(
        err,
        SqlxError::Database(db_err) if db_err.code().as_deref() == Some("23505")
    )
}
