//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::migration::Direction;

/// Core library error type
///
/// Configuration and sequence errors are raised before the database is
/// touched. Execution errors leave every earlier migration committed.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration {id} failed during {direction} ({completed} completed before it): {cause:#}")]
    Execution {
        id: String,
        direction: Direction,
        /// Migrations that finished earlier in the same call
        completed: usize,
        cause: anyhow::Error,
    },

    #[error("Sequence error: {0}")]
    Sequence(String),

    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a sequence error
    pub fn sequence(msg: impl Into<String>) -> Self {
        Self::Sequence(msg.into())
    }

    /// Id of the migration that failed, if this is an execution error
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            Self::Execution { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                let mut context = HashMap::new();
                if let MigrationError::Execution { id, direction, completed, .. } = &e {
                    context.insert("migration".to_string(), serde_json::json!(id));
                    context.insert("direction".to_string(), serde_json::json!(direction));
                    context.insert("completed".to_string(), serde_json::json!(completed));
                }
                if context.is_empty() {
                    Self::fail(e.to_string())
                } else {
                    Self::fail_with_context(e.to_string(), context)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_from_sequence_error() {
        let err: Result<i32> = Err(MigrationError::sequence("no migrations are applied"));
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert!(result.context.is_none());
        assert!(result.error.unwrap().contains("Sequence error"));
    }

    #[test]
    fn test_execution_error_carries_migration() {
        let err = MigrationError::Execution {
            id: "20240102000000_add_index".to_string(),
            direction: Direction::Up,
            completed: 1,
            cause: anyhow::anyhow!("Catalog Error: table missing"),
        };
        assert_eq!(err.migration_id(), Some("20240102000000_add_index"));

        let message = err.to_string();
        assert!(message.contains("20240102000000_add_index"));
        assert!(message.contains("up"));
        assert!(message.contains("table missing"));

        let result: OperationResult<()> = Err(err).into();
        let context = result.context.unwrap();
        assert_eq!(context["migration"], "20240102000000_add_index");
        assert_eq!(context["completed"], 1);
    }
}
