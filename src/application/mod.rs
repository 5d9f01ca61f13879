//! Application layer: services and use cases
//!
//! This layer orchestrates domain logic and depends on the graph store boundary.

pub mod error;
pub mod error_ext;
pub mod report;
pub mod services;

pub use error::{ApplicationError, ApplicationResult};
pub use error_ext::StoreResultExt;
pub use report::{BatchReport, FixReport, ItemReport, ItemStatus, RenameReport};
