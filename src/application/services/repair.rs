//! Graph repair service
//!
//! Turns analyzer issues into concrete fix plans and applies them through the
//! graph store. Every write path that changes one edge representation also
//! reconciles the other one:
//!
//! ```text
//! repoint  child.sponsorId: old -> new
//!          new.team         += child      (if missing)
//!          old.team         -= child      (if old still exists and lists it)
//! ```
//!
//! Targets are re-read right before each write; the analysis snapshot is
//! only used to decide *what* to do, never as the value written back.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::application::{BatchReport, FixReport, ItemReport};
use crate::domain::{suggest_sponsor, GraphIndex, Issue, IssueKind, Node};
use crate::infrastructure::traits::{GraphStore, StoreError};

/// A concrete change derived from an issue, shown to the operator before it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixPlan {
    RepointSponsor {
        node_id: String,
        from: Option<String>,
        to: String,
    },
    ClearSponsor {
        node_id: String,
        from: String,
    },
    AddToTeam {
        sponsor_id: String,
        child_id: String,
    },
    RemoveFromTeam {
        parent_id: String,
        child_id: String,
    },
    /// No safe automatic fix exists.
    Manual { node_id: String, reason: String },
}

impl FixPlan {
    pub fn is_automatic(&self) -> bool {
        !matches!(self, FixPlan::Manual { .. })
    }

    /// Team size of the node whose sponsor this plan changes. Its whole
    /// subtree moves along (repoint) or is cut off (clear).
    pub fn team_at_stake(&self, snapshot: &[Node]) -> usize {
        let node_id = match self {
            FixPlan::RepointSponsor { node_id, .. } | FixPlan::ClearSponsor { node_id, .. } => {
                node_id
            }
            _ => return 0,
        };
        GraphIndex::new(snapshot)
            .get(node_id)
            .map_or(0, |node| node.team.len())
    }
}

impl fmt::Display for FixPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixPlan::RepointSponsor { node_id, from, to } => write!(
                f,
                "{node_id}: sponsorId {} -> {to}; add {node_id} to {to}.team",
                from.as_deref().unwrap_or("null")
            ),
            FixPlan::ClearSponsor { node_id, from } => {
                write!(f, "{node_id}: sponsorId {from} -> null")
            }
            FixPlan::AddToTeam {
                sponsor_id,
                child_id,
            } => write!(f, "{sponsor_id}: team += {child_id}"),
            FixPlan::RemoveFromTeam {
                parent_id,
                child_id,
            } => write!(f, "{parent_id}: team -= {child_id}"),
            FixPlan::Manual { node_id, reason } => {
                write!(f, "{node_id}: requires manual resolution ({reason})")
            }
        }
    }
}

/// Derive the fix for `issue` from the snapshot it was found in.
pub fn plan_fix(issue: &Issue, snapshot: &[Node]) -> FixPlan {
    let node_id = issue.node_id.clone();
    match &issue.kind {
        IssueKind::BrokenSponsor {
            missing_sponsor_id, ..
        } => {
            let suggestion = GraphIndex::new(snapshot)
                .get(&node_id)
                .map(|node| suggest_sponsor(node, snapshot));
            match suggestion.as_ref().and_then(|s| s.actionable()) {
                Some(candidate) => FixPlan::RepointSponsor {
                    node_id,
                    from: Some(missing_sponsor_id.clone()),
                    to: candidate.to_string(),
                },
                None => FixPlan::ClearSponsor {
                    node_id,
                    from: missing_sponsor_id.clone(),
                },
            }
        }
        IssueKind::TeamSponsorMismatch {
            listed_by,
            current_sponsor_id,
        } => FixPlan::RepointSponsor {
            node_id,
            from: current_sponsor_id.clone(),
            to: listed_by.clone(),
        },
        IssueKind::SponsorTeamMismatch { sponsor_id } => FixPlan::AddToTeam {
            sponsor_id: sponsor_id.clone(),
            child_id: node_id,
        },
        IssueKind::MissingChild { missing_child_id } => FixPlan::RemoveFromTeam {
            parent_id: node_id,
            child_id: missing_child_id.clone(),
        },
        IssueKind::Orphan { .. } => {
            let Some(orphan) = GraphIndex::new(snapshot).get(&node_id) else {
                return FixPlan::Manual {
                    node_id,
                    reason: "node missing from snapshot".into(),
                };
            };
            let suggestion = suggest_sponsor(orphan, snapshot);
            match suggestion.actionable() {
                Some(candidate) => FixPlan::RepointSponsor {
                    node_id,
                    from: None,
                    to: candidate.to_string(),
                },
                None => FixPlan::Manual {
                    node_id,
                    reason: suggestion.reason,
                },
            }
        }
        IssueKind::DuplicateId { .. } => FixPlan::Manual {
            node_id,
            reason: "pick the surviving record and rename the others".into(),
        },
        IssueKind::DuplicateReferralCode { .. } => FixPlan::Manual {
            node_id,
            reason: "referral codes are public, reissuing one needs a decision".into(),
        },
        IssueKind::Cycle { .. } => FixPlan::Manual {
            node_id,
            reason: "choose which link of the cycle to cut".into(),
        },
        IssueKind::DepthDrift { .. } => FixPlan::Manual {
            node_id,
            reason: "depth is advisory".into(),
        },
    }
}

/// True if `issue` may be fixed in an unattended batch.
///
/// Only dangling team entries and team/sponsor mismatches whose correct
/// sponsor is unambiguous (exactly one node lists the child) qualify.
pub fn is_batch_safe(issue: &Issue, snapshot: &[Node]) -> bool {
    match &issue.kind {
        IssueKind::MissingChild { .. } => true,
        IssueKind::TeamSponsorMismatch { .. } => {
            let holders: HashSet<&str> = snapshot
                .iter()
                .filter(|n| n.lists(&issue.node_id))
                .map(|n| n.id.as_str())
                .collect();
            holders.len() == 1
        }
        _ => false,
    }
}

/// Graph repair service.
pub struct RepairService {
    store: Arc<dyn GraphStore>,
}

impl RepairService {
    /// Create a new repair service.
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn plan_fix(&self, issue: &Issue, snapshot: &[Node]) -> FixPlan {
        plan_fix(issue, snapshot)
    }

    /// Plan and apply the fix for one issue.
    #[instrument(skip(self, issue, snapshot), fields(kind = issue.kind.name(), node = %issue.node_id))]
    pub fn apply_fix(&self, issue: &Issue, snapshot: &[Node]) -> FixReport {
        let plan = plan_fix(issue, snapshot);
        debug!("apply_fix: plan={}", plan);
        self.execute(issue, plan)
    }

    /// Apply a previously shown plan.
    pub fn execute(&self, issue: &Issue, plan: FixPlan) -> FixReport {
        let mut steps = Vec::new();
        match &plan {
            FixPlan::RepointSponsor { node_id, from, to } => {
                self.repoint(node_id, from.as_deref(), to, &mut steps)
            }
            FixPlan::ClearSponsor { node_id, from } => self.clear_sponsor(node_id, from, &mut steps),
            FixPlan::AddToTeam {
                sponsor_id,
                child_id,
            } => self.add_to_team(sponsor_id, child_id, &mut steps),
            FixPlan::RemoveFromTeam {
                parent_id,
                child_id,
            } => self.remove_from_team(parent_id, child_id, &mut steps),
            FixPlan::Manual { node_id, reason } => {
                steps.push(ItemReport::skipped(
                    node_id.as_str(),
                    "no automatic fix",
                    reason.as_str(),
                ));
            }
        }

        for step in steps.iter().filter(|s| s.is_failed()) {
            warn!("fix step failed: {}", step);
        }
        FixReport {
            issue: issue.clone(),
            plan,
            steps,
        }
    }

    /// Apply every batch-safe issue, one after another.
    ///
    /// A failed item never stops the batch. Re-run the analyzer afterwards to
    /// see the resulting state.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub fn apply_batch(&self, issues: &[Issue], snapshot: &[Node]) -> BatchReport {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let (eligible, ineligible): (Vec<&Issue>, Vec<&Issue>) = issues
            .iter()
            .partition(|issue| is_batch_safe(issue, snapshot));
        info!(
            "apply_batch: {} eligible, {} left for manual review",
            eligible.len(),
            ineligible.len()
        );

        let mut fixes = Vec::with_capacity(eligible.len());
        for (i, issue) in eligible.into_iter().enumerate() {
            let report = self.apply_fix(issue, snapshot);
            debug!(
                "apply_batch: item {} ({} {}) success={}",
                i + 1,
                issue.kind.name(),
                issue.node_id,
                report.is_success()
            );
            fixes.push(report);
        }

        let report = BatchReport {
            run_id,
            fixes,
            ineligible: ineligible.len(),
        };
        info!(
            "apply_batch: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }

    // ============================================================
    // Plan steps
    // ============================================================

    fn repoint(&self, node_id: &str, from: Option<&str>, to: &str, steps: &mut Vec<ItemReport>) {
        let change = format!("sponsorId -> {to}");
        if node_id == to {
            steps.push(ItemReport::failed(node_id, change, "a node cannot sponsor itself"));
            return;
        }
        if let Err(e) = self.store.get_one(to) {
            steps.push(ItemReport::failed(node_id, change, format!("new sponsor: {e}")));
            return;
        }
        match self.reaches(to, node_id) {
            Ok(true) => {
                steps.push(ItemReport::failed(
                    node_id,
                    change,
                    format!("{to} is in {node_id}'s downline, repointing would create a cycle"),
                ));
                return;
            }
            Ok(false) => {}
            Err(e) => {
                steps.push(ItemReport::failed(node_id, change, e));
                return;
            }
        }

        let mut node = match self.store.get_one(node_id) {
            Ok(n) => n,
            Err(e) => {
                steps.push(ItemReport::failed(node_id, change, e));
                return;
            }
        };
        let previous = node.sponsor_id.clone();
        let change = format!(
            "sponsorId {} -> {to}",
            previous.as_deref().unwrap_or("null")
        );

        if previous.as_deref() == Some(to) {
            steps.push(ItemReport::skipped(node_id, change, "already set"));
        } else if previous.as_deref() != from {
            let now = previous.as_deref().unwrap_or("null");
            steps.push(ItemReport::skipped(
                node_id,
                format!("sponsorId {} -> {to}", from.unwrap_or("null")),
                format!("sponsorId changed to {now} since analysis"),
            ));
            return;
        } else {
            node.sponsor_id = Some(to.to_string());
            match self.store.put(node_id, &node) {
                Ok(()) => {
                    info!("repoint: {}", change);
                    steps.push(ItemReport::applied(node_id, change));
                }
                Err(e) => {
                    steps.push(ItemReport::failed(node_id, change, e));
                    return;
                }
            }
        }

        self.ensure_listed(to, node_id, steps);
        if let Some(old) = previous.filter(|p| p != to) {
            self.ensure_unlisted(&old, node_id, steps);
        }
    }

    fn clear_sponsor(&self, node_id: &str, from: &str, steps: &mut Vec<ItemReport>) {
        let change = format!("sponsorId {from} -> null");
        let mut node = match self.store.get_one(node_id) {
            Ok(n) => n,
            Err(e) => {
                steps.push(ItemReport::failed(node_id, change, e));
                return;
            }
        };
        if node.sponsor_id.as_deref() != Some(from) {
            let now = node.sponsor_id.as_deref().unwrap_or("null").to_string();
            steps.push(ItemReport::skipped(
                node_id,
                change,
                format!("sponsorId changed to {now} since analysis"),
            ));
            return;
        }
        node.sponsor_id = None;
        match self.store.put(node_id, &node) {
            Ok(()) => {
                info!("clear_sponsor: {}: {}", node_id, change);
                steps.push(ItemReport::applied(node_id, change));
            }
            Err(e) => steps.push(ItemReport::failed(node_id, change, e)),
        }
    }

    fn add_to_team(&self, sponsor_id: &str, child_id: &str, steps: &mut Vec<ItemReport>) {
        match self.store.get_one(child_id) {
            Ok(child) if child.sponsor_id.as_deref() == Some(sponsor_id) => {
                self.ensure_listed(sponsor_id, child_id, steps);
            }
            Ok(_) => steps.push(ItemReport::skipped(
                sponsor_id,
                format!("team += {child_id}"),
                format!("{child_id} no longer points at {sponsor_id}"),
            )),
            Err(e) => steps.push(ItemReport::failed(
                sponsor_id,
                format!("team += {child_id}"),
                e,
            )),
        }
    }

    fn remove_from_team(&self, parent_id: &str, child_id: &str, steps: &mut Vec<ItemReport>) {
        let change = format!("team -= {child_id}");
        match self.store.get_one(child_id) {
            Ok(_) => {
                steps.push(ItemReport::skipped(
                    parent_id,
                    change,
                    format!("{child_id} exists again"),
                ));
                return;
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => {
                steps.push(ItemReport::failed(parent_id, change, e));
                return;
            }
        }

        let mut parent = match self.store.get_one(parent_id) {
            Ok(n) => n,
            Err(e) => {
                steps.push(ItemReport::failed(parent_id, change, e));
                return;
            }
        };
        if !parent.lists(child_id) {
            steps.push(ItemReport::skipped(parent_id, change, "not listed"));
            return;
        }
        parent.team.retain(|c| c != child_id);
        match self.store.put(parent_id, &parent) {
            Ok(()) => {
                info!("remove_from_team: {}: {}", parent_id, change);
                steps.push(ItemReport::applied(parent_id, change));
            }
            Err(e) => steps.push(ItemReport::failed(parent_id, change, e)),
        }
    }

    /// Make sure `sponsor_id.team` contains `child_id`.
    fn ensure_listed(&self, sponsor_id: &str, child_id: &str, steps: &mut Vec<ItemReport>) {
        let change = format!("team += {child_id}");
        let mut sponsor = match self.store.get_one(sponsor_id) {
            Ok(n) => n,
            Err(e) => {
                steps.push(ItemReport::failed(sponsor_id, change, e));
                return;
            }
        };
        if sponsor.lists(child_id) {
            steps.push(ItemReport::skipped(sponsor_id, change, "already listed"));
            return;
        }
        sponsor.team.push(child_id.to_string());
        match self.store.put(sponsor_id, &sponsor) {
            Ok(()) => {
                info!("ensure_listed: {}: {}", sponsor_id, change);
                steps.push(ItemReport::applied(sponsor_id, change));
            }
            Err(e) => steps.push(ItemReport::failed(sponsor_id, change, e)),
        }
    }

    /// Drop `child_id` from `old_id.team` if the old sponsor still lists it.
    fn ensure_unlisted(&self, old_id: &str, child_id: &str, steps: &mut Vec<ItemReport>) {
        let change = format!("team -= {child_id}");
        let mut old = match self.store.get_one(old_id) {
            Ok(n) => n,
            Err(StoreError::NotFound(_)) => return,
            Err(e) => {
                steps.push(ItemReport::failed(old_id, change, e));
                return;
            }
        };
        if !old.lists(child_id) {
            return;
        }
        old.team.retain(|c| c != child_id);
        match self.store.put(old_id, &old) {
            Ok(()) => {
                info!("ensure_unlisted: {}: {}", old_id, change);
                steps.push(ItemReport::applied(old_id, change));
            }
            Err(e) => steps.push(ItemReport::failed(old_id, change, e)),
        }
    }

    /// True if walking up from `start` reaches `target`, reading fresh records.
    fn reaches(&self, start: &str, target: &str) -> Result<bool, StoreError> {
        let mut seen = HashSet::new();
        let mut current = Some(start.to_string());
        while let Some(id) = current {
            if id == target {
                return Ok(true);
            }
            if !seen.insert(id.clone()) {
                return Ok(false);
            }
            current = match self.store.get_one(&id) {
                Ok(node) => node.sponsor_id,
                Err(StoreError::NotFound(_)) => None,
                Err(e) => return Err(e),
            };
        }
        Ok(false)
    }
}
