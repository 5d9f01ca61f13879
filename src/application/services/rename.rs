//! Identity rename service
//!
//! Moves a node to a new id and rewrites every inbound reference:
//!
//! ```text
//! 1. put(new, node with id = new)      abort on failure, nothing changed yet
//! 2. delete(old)                       failure is reported, cascade continues
//! 3. for every node referencing old:   sponsorId / team entries -> new
//! ```
//!
//! The cascade is sequential and not transactional. Each write is reported on
//! its own; references left behind by a failed write show up as broken links
//! in the next analysis.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::application::{ApplicationResult, ItemReport, RenameReport, StoreResultExt};
use crate::domain::{DomainError, Node};
use crate::infrastructure::traits::{GraphStore, StoreError};

/// Service for renaming node ids.
pub struct RenameService {
    store: Arc<dyn GraphStore>,
}

impl RenameService {
    /// Create a new rename service.
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Check the preconditions of a rename without writing anything.
    ///
    /// Returns the record currently stored under `old_id`.
    pub fn check(&self, old_id: &str, new_id: &str) -> ApplicationResult<Node> {
        if old_id == new_id {
            return Err(DomainError::SameId(old_id.to_string()).into());
        }
        validate_id(new_id)?;

        let node = self.store.get_one(old_id).or_node_not_found(old_id)?;
        match self.store.get_one(new_id) {
            Ok(_) => Err(DomainError::IdOccupied(new_id.to_string()).into()),
            Err(StoreError::NotFound(_)) => Ok(node),
            Err(e) => Err(e).with_node_context("check new id", new_id),
        }
    }

    /// Rename `old_id` to `new_id` and cascade the change.
    ///
    /// Precondition violations are returned as `Err` before any write.
    /// Write failures are items in the returned report.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub fn rename_id(&self, old_id: &str, new_id: &str) -> ApplicationResult<RenameReport> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let node = self.check(old_id, new_id)?;
        let mut report = RenameReport {
            run_id,
            old_id: old_id.to_string(),
            new_id: new_id.to_string(),
            steps: Vec::new(),
        };

        let mut moved = node;
        moved.id = new_id.to_string();
        rewrite_references(&mut moved, old_id, new_id);
        let change = format!("record {old_id} -> {new_id}");
        if let Err(e) = self.store.put(new_id, &moved) {
            warn!("rename: writing {} failed: {}", new_id, e);
            report.steps.push(ItemReport::failed(new_id, change, e));
            return Ok(report);
        }
        info!("rename: {}", change);
        report.steps.push(ItemReport::applied(new_id, change));

        let change = format!("remove record {old_id}");
        match self.store.delete(old_id) {
            Ok(()) => report.steps.push(ItemReport::applied(old_id, change)),
            Err(e) => {
                warn!("rename: removing {} failed: {}", old_id, e);
                report.steps.push(ItemReport::failed(old_id, change, e));
            }
        }

        self.cascade(old_id, new_id, &mut report.steps);

        info!(
            "rename: {} -> {}: {} applied, {} failed",
            old_id,
            new_id,
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }

    fn cascade(&self, old_id: &str, new_id: &str, steps: &mut Vec<ItemReport>) {
        let snapshot = match self.store.list_all() {
            Ok(s) => s,
            Err(e) => {
                steps.push(ItemReport::failed("*", "scan references", e));
                return;
            }
        };

        let mut seen = HashSet::new();
        let referencing: Vec<&str> = snapshot
            .iter()
            .filter(|n| n.id != new_id && n.id != old_id && references(n, old_id))
            .map(|n| n.id.as_str())
            .filter(|id| seen.insert(*id))
            .collect();
        debug!("cascade: {} nodes reference {}", referencing.len(), old_id);

        for id in referencing {
            let change = format!("references {old_id} -> {new_id}");
            let mut node = match self.store.get_one(id) {
                Ok(n) => n,
                Err(e) => {
                    steps.push(ItemReport::failed(id, change, e));
                    continue;
                }
            };
            if !rewrite_references(&mut node, old_id, new_id) {
                steps.push(ItemReport::skipped(id, change, "no longer references old id"));
                continue;
            }
            match self.store.put(id, &node) {
                Ok(()) => {
                    debug!("cascade: {}: {}", id, change);
                    steps.push(ItemReport::applied(id, change));
                }
                Err(e) => {
                    warn!("cascade: {}: {}", id, e);
                    steps.push(ItemReport::failed(id, change, e));
                }
            }
        }
    }
}

fn references(node: &Node, id: &str) -> bool {
    node.sponsor_id.as_deref() == Some(id) || node.lists(id)
}

/// Replace `old_id` by `new_id` in `sponsor_id` and `team`. Returns true if
/// anything changed.
fn rewrite_references(node: &mut Node, old_id: &str, new_id: &str) -> bool {
    let mut changed = false;
    if node.sponsor_id.as_deref() == Some(old_id) {
        node.sponsor_id = Some(new_id.to_string());
        changed = true;
    }
    for member in node.team.iter_mut().filter(|m| *m == old_id) {
        *member = new_id.to_string();
        changed = true;
    }
    changed
}

static VALID_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s/]+$").expect("valid id pattern"));

fn validate_id(id: &str) -> Result<(), DomainError> {
    if VALID_ID.is_match(id) {
        Ok(())
    } else {
        Err(DomainError::InvalidId {
            id: id.to_string(),
            reason: "must be non-empty without whitespace or '/'".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_sponsor_and_team_entries_when_rewriting_then_all_replaced() {
        let mut node = Node::new("x", "X")
            .with_sponsor("old")
            .with_team(["a", "old", "b"]);

        assert!(rewrite_references(&mut node, "old", "new"));
        assert_eq!(node.sponsor_id.as_deref(), Some("new"));
        assert_eq!(node.team, vec!["a", "new", "b"]);
        assert!(!rewrite_references(&mut node, "old", "new"));
    }

    #[test]
    fn given_bad_ids_when_validating_then_rejected() {
        assert!(validate_id("user-42").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("a b").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("tab\there").is_err());
        assert!(validate_id("ünï-çødé").is_ok());
    }
}
