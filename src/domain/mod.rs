//! Domain layer: entities and graph algorithms
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod analyzer;
pub mod commission;
pub mod entities;
pub mod error;
pub mod resolver;
pub mod traversal;

pub use analyzer::{analyze, AnalyzerOptions};
pub use commission::{calc_order, CommissionCatalog};
pub use entities::*;
pub use error::DomainError;
pub use resolver::suggest_sponsor;
pub use traversal::{find_upline, Downline, GraphIndex};
