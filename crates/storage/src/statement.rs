//! The single write capability used by the mutation pipeline.
//!
//! SQL text is fixed at compile time (`&'static str` with `?` placeholders) and
//! every user supplied value travels as a bound [`Param`], so submitted form
//! data can never change the shape of a statement.

use async_trait::async_trait;

use crate::StorageError;

/// Value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Text(String),
    Integer(i64),
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Parameterized write statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: &'static str,
    params: Vec<Param>,
}

impl Statement {
    pub fn new(sql: &'static str) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }

    /// Appends the value for the next `?` placeholder.
    pub fn bind(mut self, value: impl Into<Param>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &'static str {
        self.sql
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

/// Executes write statements against the persistence backend.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Runs one statement and returns the number of affected rows.
    async fn execute(&self, statement: &Statement) -> Result<u64, StorageError>;
}
