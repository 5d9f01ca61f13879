//! Error conversion helpers for store operations
//!
//! Provides an extension trait for cleaner error handling with node context.

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::DomainError;
use crate::infrastructure::traits::{StoreError, StoreResult};

/// Extension trait for converting `StoreResult` to `ApplicationResult` with context.
pub trait StoreResultExt<T> {
    /// Add action and node context to a store error.
    ///
    /// # Example
    /// ```ignore
    /// let node = store.get_one(id).with_node_context("load node", id)?;
    /// ```
    fn with_node_context(self, action: &str, id: &str) -> ApplicationResult<T>;

    /// Like `with_node_context`, but a missing record becomes
    /// `DomainError::NodeNotFound`.
    fn or_node_not_found(self, id: &str) -> ApplicationResult<T>;
}

impl<T> StoreResultExt<T> for StoreResult<T> {
    fn with_node_context(self, action: &str, id: &str) -> ApplicationResult<T> {
        self.map_err(|e| ApplicationError::OperationFailed {
            context: format!("{}: {}", action, id),
            source: Box::new(e),
        })
    }

    fn or_node_not_found(self, id: &str) -> ApplicationResult<T> {
        self.map_err(|e| match e {
            StoreError::NotFound(_) => DomainError::NodeNotFound(id.to_string()).into(),
            other => ApplicationError::OperationFailed {
                context: format!("load node: {}", id),
                source: Box::new(other),
            },
        })
    }
}
