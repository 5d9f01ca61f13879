//! Integrity service
//!
//! Loads a snapshot through the store and runs the pure analyzer and resolver
//! over it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::application::ApplicationResult;
use crate::config::Settings;
use crate::domain::{analyze, suggest_sponsor, DomainError, GraphIndex, Issue, Node, Suggestion};
use crate::infrastructure::traits::GraphStore;

/// A snapshot and the issues found in it.
///
/// Repairs are planned against `snapshot`; their writes re-read fresh state.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub snapshot: Vec<Node>,
    pub issues: Vec<Issue>,
    pub analyzed_at: DateTime<Utc>,
}

impl Analysis {
    /// Issue by its 1-based position, as listed to the operator.
    pub fn issue(&self, number: usize) -> Option<&Issue> {
        number.checked_sub(1).and_then(|i| self.issues.get(i))
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Service for integrity analysis and sponsor suggestions.
pub struct IntegrityService {
    store: Arc<dyn GraphStore>,
    settings: Arc<Settings>,
}

impl IntegrityService {
    /// Create a new integrity service.
    pub fn new(store: Arc<dyn GraphStore>, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    /// Full snapshot of the graph.
    pub fn snapshot(&self) -> ApplicationResult<Vec<Node>> {
        let nodes = self.store.list_all()?;
        debug!("snapshot: {} records", nodes.len());
        Ok(nodes)
    }

    /// Analyze a fresh snapshot now.
    pub fn analyze(&self) -> ApplicationResult<Analysis> {
        self.analyze_at(Utc::now())
    }

    /// Analyze a fresh snapshot as of `now`.
    #[instrument(skip(self))]
    pub fn analyze_at(&self, now: DateTime<Utc>) -> ApplicationResult<Analysis> {
        let snapshot = self.snapshot()?;
        let issues = analyze(&snapshot, &self.settings.analyzer_options(now));
        debug!("analyze: {} issues in {} records", issues.len(), snapshot.len());
        Ok(Analysis {
            snapshot,
            issues,
            analyzed_at: now,
        })
    }

    /// Suggest a sponsor for `node_id` from its invitation code.
    #[instrument(skip(self))]
    pub fn suggest(&self, node_id: &str) -> ApplicationResult<Suggestion> {
        let snapshot = self.snapshot()?;
        let node = GraphIndex::new(&snapshot)
            .get(node_id)
            .ok_or_else(|| DomainError::NodeNotFound(node_id.to_string()))?;
        let suggestion = suggest_sponsor(node, &snapshot);
        debug!(
            "suggest: {} -> {:?} ({:?})",
            node_id, suggestion.candidate, suggestion.confidence
        );
        Ok(suggestion)
    }
}
