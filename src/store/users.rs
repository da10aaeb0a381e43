use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{Instrument, info_span};

use super::is_unique_violation;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password_hash: String,
    pub verified: bool,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
}

const USER_COLUMNS: &str = "id, email, password_hash, verified, totp_secret, totp_enabled";

/// Outcome of an insert that can collide on a unique email.
#[derive(Debug, PartialEq, Eq)]
pub enum EmailWrite {
    Done,
    EmailTaken,
}

pub async fn insert(pool: &PgPool, id: &str, email: &str, password_hash: &str) -> Result<EmailWrite> {
    let query = "INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3)";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    match sqlx::query(query)
        .bind(id)
        .bind(email)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
    {
        Ok(_) => Ok(EmailWrite::Done),
        Err(err) if is_unique_violation(&err) => Ok(EmailWrite::EmailTaken),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );

    sqlx::query_as::<_, User>(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user by email")
}

pub async fn get_by_id(pool: &PgPool, id: &str) -> Result<Option<User>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );

    sqlx::query_as::<_, User>(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user by id")
}

pub async fn list(pool: &PgPool) -> Result<Vec<User>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );

    sqlx::query_as::<_, User>(&query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list users")
}

pub async fn set_verified(pool: &PgPool, id: &str, verified: bool) -> Result<()> {
    let query = "UPDATE users SET verified = $2 WHERE id = $1";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );

    sqlx::query(query)
        .bind(id)
        .bind(verified)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update user verification")?;

    Ok(())
}

pub async fn set_password_hash(pool: &PgPool, id: &str, password_hash: &str) -> Result<()> {
    let query = "UPDATE users SET password_hash = $2 WHERE id = $1";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );

    sqlx::query(query)
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password hash")?;

    Ok(())
}

/// Change the address and clear the verified flag in one statement, so a new
/// address is never marked verified.
pub async fn set_email(pool: &PgPool, id: &str, email: &str) -> Result<EmailWrite> {
    let query = "UPDATE users SET email = $2, verified = FALSE WHERE id = $1";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );

    match sqlx::query(query)
        .bind(id)
        .bind(email)
        .execute(pool)
        .instrument(span)
        .await
    {
        Ok(_) => Ok(EmailWrite::Done),
        Err(err) if is_unique_violation(&err) => Ok(EmailWrite::EmailTaken),
        Err(err) => Err(err).context("failed to update email"),
    }
}

pub async fn set_totp_secret(pool: &PgPool, id: &str, secret: Option<&str>) -> Result<()> {
    let query = "UPDATE users SET totp_secret = $2, totp_enabled = FALSE WHERE id = $1";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );

    sqlx::query(query)
        .bind(id)
        .bind(secret)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update TOTP secret")?;

    Ok(())
}

pub async fn set_totp_enabled(pool: &PgPool, id: &str, enabled: bool) -> Result<()> {
    let query = "UPDATE users SET totp_enabled = $2 WHERE id = $1";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );

    sqlx::query(query)
        .bind(id)
        .bind(enabled)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update TOTP flag")?;

    Ok(())
}

pub async fn delete(pool: &PgPool, id: &str) -> Result<()> {
    let query = "DELETE FROM users WHERE id = $1";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );

    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete user")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_never_serialize() {
        let user = User {
            id: "u1".to_string(),
            email: "a@example.com".to_string(),
            password_hash: "$argon2id$hash".to_string(),
            verified: true,
            totp_secret: Some("SECRET".to_string()),
            totp_enabled: true,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("SECRET"));
        assert!(json.contains("a@example.com"));
    }

    #[test]
    fn deserializes_without_secret_fields() {
        let user: User = serde_json::from_str(
            r#"{"id":"u1","email":"a@example.com","verified":false,"totp_enabled":false}"#,
        )
        .unwrap();
        assert_eq!(user.password_hash, "");
        assert_eq!(user.totp_secret, None);
    }
}
