//! Backing-store session abstraction
//!
//! The journal never talks wire protocol; it prepares statements once and
//! executes bound statements through this port. Implementations wrap a real
//! wide-column driver session or, for development and testing, an in-memory
//! emulation.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::JournalError;

/// A bindable parameter or result column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    BigInt(i64),
    Int(i32),
    Blob(Vec<u8>),
    Uuid(Uuid),
    TextSet(Vec<String>),
    Null
}

/// Handle to a statement prepared on the session
///
/// Repeated `prepare` calls for the same text must be idempotent; the handle
/// is cheap to clone and valid for the session's lifetime.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub id:  u64,
    pub cql: Arc<str>
}

/// A prepared statement with bound parameter values and an execution profile
#[derive(Debug, Clone)]
pub struct BoundStatement {
    pub statement: PreparedStatement,
    pub values:    Vec<Value>,
    pub profile:   String
}

impl BoundStatement {
    pub fn new(statement: PreparedStatement, values: Vec<Value>, profile: impl Into<String>) -> Self {
        Self { statement, values, profile: profile.into() }
    }
}

/// One result row, addressed by column name
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: HashMap<String, Value>
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: impl Into<String>, value: Value) -> Self {
        self.columns.insert(name.into(), value);
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.get(name)
    }

    pub fn bigint(&self, name: &str) -> Result<i64, JournalError> {
        match self.columns.get(name) {
            Some(Value::BigInt(v)) => Ok(*v),
            other => Err(Self::column_error(name, "bigint", other))
        }
    }

    pub fn int(&self, name: &str) -> Result<i32, JournalError> {
        match self.columns.get(name) {
            Some(Value::Int(v)) => Ok(*v),
            other => Err(Self::column_error(name, "int", other))
        }
    }

    pub fn text(&self, name: &str) -> Result<String, JournalError> {
        match self.columns.get(name) {
            Some(Value::Text(v)) => Ok(v.clone()),
            other => Err(Self::column_error(name, "text", other))
        }
    }

    pub fn blob(&self, name: &str) -> Result<Vec<u8>, JournalError> {
        match self.columns.get(name) {
            Some(Value::Blob(v)) => Ok(v.clone()),
            other => Err(Self::column_error(name, "blob", other))
        }
    }

    pub fn uuid(&self, name: &str) -> Result<Uuid, JournalError> {
        match self.columns.get(name) {
            Some(Value::Uuid(v)) => Ok(*v),
            other => Err(Self::column_error(name, "uuid", other))
        }
    }

    pub fn text_set(&self, name: &str) -> Result<Vec<String>, JournalError> {
        match self.columns.get(name) {
            Some(Value::TextSet(v)) => Ok(v.clone()),
            Some(Value::Null) | None => Ok(Vec::new()),
            other => Err(Self::column_error(name, "set<text>", other))
        }
    }

    fn column_error(name: &str, expected: &str, found: Option<&Value>) -> JournalError {
        JournalError::Deserialization(format!("column '{}' is not a {}: {:?}", name, expected, found))
    }
}

/// Port to the backing wide-column store
#[async_trait]
pub trait Session: Send + Sync {
    /// Prepares a statement; repeated calls with the same text are idempotent
    async fn prepare(&self, cql: &str) -> Result<PreparedStatement, JournalError>;

    /// Executes one bound statement and returns its result rows
    async fn execute(&self, statement: &BoundStatement) -> Result<Vec<Row>, JournalError>;

    /// Executes bound statements as a single unlogged batch
    async fn execute_batch(&self, statements: &[BoundStatement], profile: &str) -> Result<(), JournalError>;
}
