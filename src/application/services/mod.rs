//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on the `GraphStore` boundary trait but are themselves
//! concrete structs, not traits.

mod integrity;
mod orders;
mod rename;
mod repair;

pub use integrity::{Analysis, IntegrityService};
pub use orders::{OrderService, QuotedOrder};
pub use rename::RenameService;
pub use repair::{is_batch_safe, plan_fix, FixPlan, RepairService};
