//! Postgres-backed credential store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use super::{normalize_email, CredentialStore, NewUser, StoreError, User, UserUpdate};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `users` table and indexes if they are missing.
    ///
    /// # Errors
    /// Returns an error if any schema statement fails.
    pub async fn apply_schema(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire connection for schema setup")?;

        for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
            sqlx::query(statement)
                .execute(&mut *conn)
                .instrument(db_span("DDL", "schema.sql"))
                .await
                .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
        }

        Ok(())
    }
}

fn db_span(operation: &'static str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse()?,
        status: status.parse()?,
        provider: row.try_get("provider")?,
        created_at_unix: row.try_get("created_at_unix")?,
        updated_at_unix: row.try_get("updated_at_unix")?,
    })
}

/// Translate constraint violations into store errors callers can act on.
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let code = db_err.code();
        let code = code.as_deref();
        if code == Some(UNIQUE_VIOLATION) {
            return match db_err.constraint() {
                Some("users_email_key") => StoreError::Conflict("email"),
                _ => StoreError::Conflict("username"),
            };
        }
        if code == Some(CHECK_VIOLATION) && db_err.constraint() == Some("users_credential_check") {
            return StoreError::MissingCredential;
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let query = r"
            SELECT id, username, email, password_hash, role, status, provider,
                EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix,
                EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at_unix
            FROM users
            WHERE lower(username) = lower($1)
        ";
        let row = sqlx::query(query)
            .bind(username.trim())
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = r"
            SELECT id, username, email, password_hash, role, status, provider,
                EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix,
                EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at_unix
            FROM users
            WHERE email = $1
        ";
        let row = sqlx::query(query)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = r"
            SELECT id, username, email, password_hash, role, status, provider,
                EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix,
                EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at_unix
            FROM users
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<User>, i64), StoreError> {
        let count_query = "SELECT COUNT(*) AS total FROM users";
        let total: i64 = sqlx::query(count_query)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", count_query))
            .await?
            .try_get("total")?;

        let query = r"
            SELECT id, username, email, password_hash, role, status, provider,
                EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix,
                EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at_unix
            FROM users
            ORDER BY created_at DESC, username ASC
            OFFSET $1
            LIMIT $2
        ";
        let rows = sqlx::query(query)
            .bind(offset.max(0))
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        let users = rows.iter().map(user_from_row).collect::<Result<_, _>>()?;
        Ok((users, total))
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        user.check_credential()?;
        let query = r"
            INSERT INTO users (id, username, email, password_hash, role, status, provider)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, username, email, password_hash, role, status, provider,
                EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix,
                EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at_unix
        ";
        let row = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(normalize_email(&user.email))
            .bind(user.password_hash.as_deref())
            .bind(user.role.as_str())
            .bind(user.status.as_str())
            .bind(user.provider.as_deref())
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(map_write_error)?;
        user_from_row(&row)
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<Option<User>, StoreError> {
        let query = r"
            UPDATE users
            SET
                username = COALESCE($1, username),
                role = COALESCE($2, role),
                status = COALESCE($3, status),
                updated_at = NOW()
            WHERE id = $4
            RETURNING id, username, email, password_hash, role, status, provider,
                EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix,
                EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at_unix
        ";
        let row = sqlx::query(query)
            .bind(update.username.as_deref())
            .bind(update.role.map(|role| role.as_str()))
            .bind(update.status.map(|status| status.as_str()))
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .map_err(map_write_error)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = "DELETE FROM users WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await?;
        conn.ping()
            .instrument(info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[test]
    fn split_sql_statements_handles_schema_file() {
        let statements = split_sql_statements(SCHEMA_SQL);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS users"));
        assert!(statements.iter().all(|s| s.ends_with(';')));
    }

    #[test]
    fn split_sql_statements_keeps_unterminated_tail() {
        let statements = split_sql_statements("SELECT 1;\n-- note\nSELECT 2");
        assert_eq!(statements, vec!["SELECT 1;".to_string(), "SELECT 2".to_string()]);
    }

    #[derive(Debug)]
    struct TestDbError {
        code: &'static str,
        constraint: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: &'static str, constraint: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(TestDbError { code, constraint }))
    }

    #[test]
    fn unique_violation_maps_to_conflicting_field() {
        assert!(matches!(
            map_write_error(db_error(UNIQUE_VIOLATION, Some("users_email_key"))),
            StoreError::Conflict("email")
        ));
        assert!(matches!(
            map_write_error(db_error(UNIQUE_VIOLATION, Some("users_username_lower_key"))),
            StoreError::Conflict("username")
        ));
    }

    #[test]
    fn credential_check_violation_maps_to_missing_credential() {
        assert!(matches!(
            map_write_error(db_error(CHECK_VIOLATION, Some("users_credential_check"))),
            StoreError::MissingCredential
        ));
    }

    #[test]
    fn other_errors_pass_through() {
        assert!(matches!(
            map_write_error(sqlx::Error::RowNotFound),
            StoreError::Database(sqlx::Error::RowNotFound)
        ));
        assert!(matches!(
            map_write_error(db_error("99999", None)),
            StoreError::Database(_)
        ));
    }
}
