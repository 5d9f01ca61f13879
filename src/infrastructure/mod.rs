//! Infrastructure layer: store implementations and DI container
//!
//! This layer implements the graph store boundary and wires up services.

pub mod di;
pub mod error;
pub mod traits;

pub use error::InfraError;
pub use traits::{GraphStore, InMemoryGraphStore, JsonFileGraphStore, StoreError, StoreResult};
