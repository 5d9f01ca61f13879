//! Itemized outcomes of repair and rename operations.
//!
//! Writes are independent, so a report lists every attempted step with its
//! own status instead of collapsing the operation into one boolean.

use std::fmt;

use uuid::Uuid;

use crate::application::services::FixPlan;
use crate::domain::Issue;

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Applied,
    /// Nothing to do, or the data changed since analysis.
    Skipped(String),
    Failed(String),
}

/// One attempted write (or deliberately skipped write).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    /// Node id the step touches.
    pub target: String,
    /// Human-readable old → new description.
    pub change: String,
    pub status: ItemStatus,
}

impl ItemReport {
    pub fn applied(target: impl Into<String>, change: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            change: change.into(),
            status: ItemStatus::Applied,
        }
    }

    pub fn skipped(
        target: impl Into<String>,
        change: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            change: change.into(),
            status: ItemStatus::Skipped(reason.into()),
        }
    }

    pub fn failed(
        target: impl Into<String>,
        change: impl Into<String>,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            target: target.into(),
            change: change.into(),
            status: ItemStatus::Failed(error.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ItemStatus::Failed(_))
    }

    pub fn is_applied(&self) -> bool {
        self.status == ItemStatus::Applied
    }
}

impl fmt::Display for ItemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            ItemStatus::Applied => write!(f, "{}: {}", self.target, self.change),
            ItemStatus::Skipped(reason) => {
                write!(f, "{}: {} (skipped: {})", self.target, self.change, reason)
            }
            ItemStatus::Failed(error) => {
                write!(f, "{}: {} (failed: {})", self.target, self.change, error)
            }
        }
    }
}

/// Result of applying one fix.
#[derive(Debug, Clone)]
pub struct FixReport {
    pub issue: Issue,
    pub plan: FixPlan,
    pub steps: Vec<ItemReport>,
}

impl FixReport {
    /// True if the plan was automatic and no step failed.
    pub fn is_success(&self) -> bool {
        self.plan.is_automatic() && !self.steps.iter().any(ItemReport::is_failed)
    }

    pub fn needs_manual_resolution(&self) -> bool {
        !self.plan.is_automatic()
    }
}

/// Result of a sequential batch of fixes.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub fixes: Vec<FixReport>,
    /// Issues left out because they are not safe to fix unattended.
    pub ineligible: usize,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.fixes.iter().filter(|f| f.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.fixes.len() - self.succeeded()
    }
}

/// Result of an identity rename and its cascade.
#[derive(Debug, Clone)]
pub struct RenameReport {
    pub run_id: Uuid,
    pub old_id: String,
    pub new_id: String,
    pub steps: Vec<ItemReport>,
}

impl RenameReport {
    pub fn succeeded(&self) -> usize {
        self.steps.iter().filter(|s| s.is_applied()).count()
    }

    pub fn failed(&self) -> usize {
        self.steps.iter().filter(|s| s.is_failed()).count()
    }

    /// True if every step went through: no reference to the old id remains.
    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }
}
