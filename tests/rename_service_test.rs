//! Tests for RenameService: preconditions, cascade and partial failure

use std::collections::HashSet;
use std::sync::Arc;

use rstest::rstest;
use serde_json::json;

use sponsorgraph::application::services::RenameService;
use sponsorgraph::application::ApplicationError;
use sponsorgraph::domain::{analyze, AnalyzerOptions, DomainError, Node};
use sponsorgraph::infrastructure::{GraphStore, InMemoryGraphStore, StoreError, StoreResult};
use sponsorgraph::util::testing;

/// Store that fails writes to selected ids.
struct FlakyStore {
    inner: InMemoryGraphStore,
    fail_put: HashSet<String>,
}

impl GraphStore for FlakyStore {
    fn list_all(&self) -> StoreResult<Vec<Node>> {
        self.inner.list_all()
    }

    fn get_one(&self, id: &str) -> StoreResult<Node> {
        self.inner.get_one(id)
    }

    fn put(&self, id: &str, node: &Node) -> StoreResult<()> {
        if self.fail_put.contains(id) {
            return Err(StoreError::Unavailable(format!("injected failure writing {id}")));
        }
        self.inner.put(id, node)
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        self.inner.delete(id)
    }
}

/// admin -> p -> {c1, c2}
fn family() -> Vec<Node> {
    vec![
        Node::new("admin", "ADM").with_team(["p"]),
        Node::new("p", "PPP").with_sponsor("admin").with_team(["c1", "c2"]),
        Node::new("c1", "C1").with_sponsor("p"),
        Node::new("c2", "C2").with_sponsor("p"),
    ]
}

fn references(nodes: &[Node], id: &str) -> Vec<String> {
    nodes
        .iter()
        .filter(|n| n.id == id || n.sponsor_id.as_deref() == Some(id) || n.lists(id))
        .map(|n| n.id.clone())
        .collect()
}

#[test]
fn given_parent_with_children_when_renaming_then_every_reference_follows() {
    // Arrange
    testing::init_test_setup();
    let store = Arc::new(InMemoryGraphStore::with_nodes(family()));
    let service = RenameService::new(store.clone());

    // Act
    let report = service.rename_id("p", "p-new").unwrap();

    // Assert
    assert!(report.is_complete(), "steps: {:?}", report.steps);
    let after = store.list_all().unwrap();
    assert!(references(&after, "p").is_empty(), "left: {after:?}");

    let renamed = store.get_one("p-new").unwrap();
    assert_eq!(renamed.sponsor_id.as_deref(), Some("admin"));
    assert_eq!(renamed.team, vec!["c1", "c2"]);
    assert_eq!(renamed.referral_code, "PPP");
    assert_eq!(store.get_one("c1").unwrap().sponsor_id.as_deref(), Some("p-new"));
    assert_eq!(store.get_one("c2").unwrap().sponsor_id.as_deref(), Some("p-new"));
    assert_eq!(store.get_one("admin").unwrap().team, vec!["p-new"]);
    assert!(analyze(&after, &AnalyzerOptions::new(["admin"])).is_empty());
}

#[test]
fn given_unknown_fields_when_renaming_then_they_survive() {
    let mut p = Node::new("p", "PPP").with_sponsor("admin");
    p.extra.insert("balance".into(), json!(1250));
    let store = Arc::new(InMemoryGraphStore::with_nodes(vec![
        Node::new("admin", "ADM").with_team(["p"]),
        p,
    ]));
    let service = RenameService::new(store.clone());

    service.rename_id("p", "q").unwrap();

    assert_eq!(store.get_one("q").unwrap().extra.get("balance"), Some(&json!(1250)));
}

#[test]
fn given_self_sponsored_node_when_renaming_then_self_reference_is_rewritten() {
    let store = Arc::new(InMemoryGraphStore::with_nodes(vec![
        Node::new("loop", "L").with_sponsor("loop").with_team(["loop"]),
    ]));
    let service = RenameService::new(store.clone());

    let report = service.rename_id("loop", "loop2").unwrap();

    assert!(report.is_complete());
    let node = store.get_one("loop2").unwrap();
    assert_eq!(node.sponsor_id.as_deref(), Some("loop2"));
    assert_eq!(node.team, vec!["loop2"]);
}

// ============================================================
// Preconditions
// ============================================================

#[rstest]
#[case("p", "p")]
#[case("missing", "x")]
#[case("p", "c1")]
#[case("p", "has space")]
#[case("p", "a/b")]
#[case("p", "")]
fn given_violated_precondition_when_renaming_then_rejected_without_writes(
    #[case] old: &str,
    #[case] new: &str,
) {
    // Arrange
    let store = Arc::new(InMemoryGraphStore::with_nodes(family()));
    let service = RenameService::new(store.clone());

    // Act
    let result = service.rename_id(old, new);

    // Assert
    assert!(matches!(result, Err(ApplicationError::Domain(_))));
    assert_eq!(store.list_all().unwrap(), family());
}

#[test]
fn given_occupied_target_when_renaming_then_id_occupied() {
    let store = Arc::new(InMemoryGraphStore::with_nodes(family()));
    let service = RenameService::new(store);

    let err = service.rename_id("c1", "c2").unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::IdOccupied(id)) if id == "c2"
    ));
}

#[test]
fn given_missing_source_when_renaming_then_node_not_found() {
    let store = Arc::new(InMemoryGraphStore::with_nodes(family()));
    let service = RenameService::new(store);

    let err = service.rename_id("nobody", "somebody").unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::NodeNotFound(id)) if id == "nobody"
    ));
}

// ============================================================
// Partial failure
// ============================================================

#[test]
fn given_failing_child_write_when_renaming_then_rest_of_cascade_applies() {
    // Arrange
    testing::init_test_setup();
    let store = Arc::new(FlakyStore {
        inner: InMemoryGraphStore::with_nodes(family()),
        fail_put: HashSet::from(["c1".to_string()]),
    });
    let service = RenameService::new(store.clone());

    // Act
    let report = service.rename_id("p", "p-new").unwrap();

    // Assert
    assert!(!report.is_complete());
    assert_eq!(report.failed(), 1);
    assert!(report.steps.iter().any(|s| s.target == "c1" && s.is_failed()));
    assert_eq!(store.get_one("c2").unwrap().sponsor_id.as_deref(), Some("p-new"));
    assert_eq!(store.get_one("admin").unwrap().team, vec!["p-new"]);
    assert_eq!(store.get_one("c1").unwrap().sponsor_id.as_deref(), Some("p"));

    let issues = analyze(&store.list_all().unwrap(), &AnalyzerOptions::new(["admin"]));
    assert!(issues
        .iter()
        .any(|i| i.node_id == "c1" && i.kind.name() == "brokenSponsor"));
}

#[test]
fn given_failing_write_of_new_record_when_renaming_then_nothing_changes() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryGraphStore::with_nodes(family()),
        fail_put: HashSet::from(["p-new".to_string()]),
    });
    let service = RenameService::new(store.clone());

    let report = service.rename_id("p", "p-new").unwrap();

    assert_eq!(report.steps.len(), 1);
    assert!(report.steps[0].is_failed());
    assert_eq!(store.list_all().unwrap(), family());
}
