pub mod customers;
pub mod invoices;
pub mod statement;
pub mod views;

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use thiserror::Error;

pub use customers::{CustomerRepository, NewCustomer};
pub use invoices::{InvoiceChanges, InvoiceRepository, NewInvoice};
pub use statement::{Param, Statement, StatementExecutor};
pub use views::{CachedView, ViewCache, ViewInvalidator};

/// SQLite extended result code for a violated UNIQUE constraint.
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    ///
    /// Every pooled connection enforces foreign keys and uses WAL journaling
    /// with a 5 second busy timeout.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to read invoices.
    pub fn invoices(&self) -> InvoiceRepository {
        InvoiceRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to read customers.
    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for operator accounts.
    pub fn operators(&self) -> OperatorRepository {
        OperatorRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for operator sessions.
    pub fn sessions(&self) -> SessionRepository {
        SessionRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl StatementExecutor for Database {
    async fn execute(&self, statement: &Statement) -> Result<u64, StorageError> {
        let mut query = sqlx::query(statement.sql());
        for param in statement.params() {
            query = match param {
                Param::Text(value) => query.bind(value.as_str()),
                Param::Integer(value) => query.bind(*value),
            };
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("failed to decode row: {0}")]
    Decode(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for operator accounts used by the login flow.
#[derive(Clone)]
pub struct OperatorRepository {
    pool: SqlitePool,
}

impl OperatorRepository {
    /// Inserts a new operator. Emails are unique regardless of case.
    pub async fn insert(&self, operator: &NewOperator<'_>) -> Result<(), OperatorError> {
        sqlx::query(
            "INSERT INTO operators (id, name, email, password_salt, password_hash, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(operator.id)
        .bind(operator.name)
        .bind(operator.email)
        .bind(operator.password_salt)
        .bind(operator.password_hash)
        .bind(to_rfc3339(operator.created_at))
        .execute(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_UNIQUE) {
                    OperatorError::DuplicateEmail
                } else {
                    OperatorError::Database(sqlx::Error::Database(db_err))
                }
            }
            other => OperatorError::Database(other),
        })?;

        Ok(())
    }

    /// Looks up an operator by email (case-insensitive).
    pub async fn find_by_email(&self, email: &str) -> Result<Option<OperatorRecord>, StorageError> {
        let record = sqlx::query_as::<_, OperatorRecord>(
            "SELECT id, name, email, password_salt, password_hash FROM operators WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }
}

/// Payload required to create an operator account.
pub struct NewOperator<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password_salt: &'a str,
    pub password_hash: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Stored operator account.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OperatorRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_salt: String,
    pub password_hash: String,
}

/// Errors that can occur while creating operators.
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("an operator with this email already exists")]
    DuplicateEmail,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

/// Repository backing signed session tokens with revocable rows.
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub async fn insert(&self, session: &NewSession<'_>) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO sessions (id, operator_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session.id)
        .bind(session.operator_id)
        .bind(to_rfc3339(session.created_at))
        .bind(to_rfc3339(session.expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the session when it exists, is not revoked and has not expired at `now`.
    pub async fn find_active(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, operator_id, created_at, expires_at FROM sessions \
             WHERE id = ? AND revoked_at IS NULL AND expires_at > ?",
        )
        .bind(id)
        .bind(to_rfc3339(now))
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Marks the session revoked. Returns `false` when it was unknown or already revoked.
    pub async fn revoke(&self, id: &str, now: DateTime<Utc>) -> Result<bool, StorageError> {
        let result =
            sqlx::query("UPDATE sessions SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL")
                .bind(to_rfc3339(now))
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes sessions that expired or were revoked before `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let now = to_rfc3339(now);
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ? OR revoked_at <= ?")
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Payload required to persist a session.
pub struct NewSession<'a> {
    pub id: &'a str,
    pub operator_id: &'a str,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Session row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: String,
    pub operator_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
