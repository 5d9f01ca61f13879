//! Tests for the graph integrity analyzer

use chrono::{Duration, TimeZone, Utc};
use rstest::{fixture, rstest};

use sponsorgraph::domain::{analyze, AnalyzerOptions, IssueKind, Node, Severity};

#[fixture]
fn options() -> AnalyzerOptions {
    AnalyzerOptions::new(["admin"]).at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
}

/// admin -> {a, b}, a -> {c}; all links consistent.
fn healthy() -> Vec<Node> {
    vec![
        Node::new("admin", "ADM").with_team(["a", "b"]),
        Node::new("a", "AAA").with_sponsor("admin").with_team(["c"]),
        Node::new("b", "BBB").with_sponsor("admin"),
        Node::new("c", "CCC").with_sponsor("a"),
    ]
}

#[rstest]
fn given_consistent_graph_when_analyzing_then_no_issues(options: AnalyzerOptions) {
    assert!(analyze(&healthy(), &options).is_empty());
}

#[rstest]
fn given_five_nodes_with_one_broken_sponsor_when_analyzing_then_exactly_one_issue(
    options: AnalyzerOptions,
) {
    // Arrange
    let mut nodes = healthy();
    nodes.push(Node::new("x", "XXX").with_sponsor("adminn"));

    // Act
    let issues = analyze(&nodes, &options);

    // Assert
    assert_eq!(issues.len(), 1, "unexpected issues: {issues:?}");
    let issue = &issues[0];
    assert_eq!(issue.node_id, "x");
    assert_eq!(issue.severity, Severity::Critical);
    match &issue.kind {
        IssueKind::BrokenSponsor {
            missing_sponsor_id,
            similar_ids,
        } => {
            assert_eq!(missing_sponsor_id, "adminn");
            assert_eq!(similar_ids, &vec!["admin".to_string()]);
        }
        other => panic!("expected brokenSponsor, got {other:?}"),
    }
}

#[rstest]
fn given_two_records_with_same_id_when_analyzing_then_one_duplicate_issue_lists_both(
    options: AnalyzerOptions,
) {
    // Arrange
    let mut nodes = healthy();
    nodes.push(Node::new("b", "BBB-2").with_sponsor("admin"));

    // Act
    let issues = analyze(&nodes, &options);

    // Assert
    assert_eq!(issues.len(), 1, "unexpected issues: {issues:?}");
    match &issues[0].kind {
        IssueKind::DuplicateId { records } => {
            let indexes: Vec<usize> = records.iter().map(|r| r.index).collect();
            assert_eq!(indexes, vec![2, 4]);
            assert_eq!(records[1].referral_code, "BBB-2");
        }
        other => panic!("expected duplicateId, got {other:?}"),
    }
}

#[rstest]
fn given_three_colliding_records_when_analyzing_then_all_are_reported(options: AnalyzerOptions) {
    let mut nodes = healthy();
    nodes.push(Node::new("c", "C2").with_sponsor("a"));
    nodes.push(Node::new("c", "C3").with_sponsor("a"));

    let issues = analyze(&nodes, &options);

    let dup = issues
        .iter()
        .find_map(|i| match &i.kind {
            IssueKind::DuplicateId { records } => Some(records.len()),
            _ => None,
        })
        .expect("duplicateId issue");
    assert_eq!(dup, 3);
}

#[rstest]
fn given_dangling_team_entry_when_analyzing_then_missing_child(options: AnalyzerOptions) {
    let mut nodes = healthy();
    nodes[2].team.push("ghost".into());

    let issues = analyze(&nodes, &options);

    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].node_id, "b");
    assert_eq!(
        issues[0].kind,
        IssueKind::MissingChild {
            missing_child_id: "ghost".into()
        }
    );
}

#[rstest]
fn given_child_listed_by_wrong_parent_when_analyzing_then_both_mismatches(
    options: AnalyzerOptions,
) {
    // Arrange: c points at a, but only b lists it
    let mut nodes = healthy();
    nodes[1].team.clear();
    nodes[2].team.push("c".into());

    // Act
    let issues = analyze(&nodes, &options);

    // Assert
    let kinds: Vec<&str> = issues.iter().map(|i| i.kind.name()).collect();
    assert_eq!(kinds, vec!["teamSponsorMismatch", "sponsorTeamMismatch"]);
    assert_eq!(
        issues[0].kind,
        IssueKind::TeamSponsorMismatch {
            listed_by: "b".into(),
            current_sponsor_id: Some("a".into()),
        }
    );
    assert_eq!(issues[1].severity, Severity::Medium);
}

#[rstest]
fn given_orphans_when_analyzing_then_root_is_exempt_and_evidence_recorded(
    options: AnalyzerOptions,
) {
    // Arrange
    let now = options.now;
    let mut nodes = healthy();
    nodes.push(
        Node::new("new", "NEW")
            .with_team(["kid"])
            .registered_at(now - Duration::days(3)),
    );
    nodes.push(Node::new("kid", "KID").with_sponsor("new"));
    nodes.push(Node::new("old", "OLD").registered_at(now - Duration::days(400)));

    // Act
    let issues = analyze(&nodes, &options);

    // Assert
    assert_eq!(issues.len(), 2);
    assert!(issues.iter().all(|i| i.node_id != "admin"));
    let evidence: Vec<(&str, usize, bool)> = issues
        .iter()
        .filter_map(|i| match i.kind {
            IssueKind::Orphan {
                team_size,
                registered_recently,
            } => Some((i.node_id.as_str(), team_size, registered_recently)),
            _ => None,
        })
        .collect();
    assert!(evidence.contains(&("new", 1, true)));
    assert!(evidence.contains(&("old", 0, false)));
}

#[rstest]
fn given_sponsor_loop_when_analyzing_then_single_cycle_issue_at_smallest_id(
    options: AnalyzerOptions,
) {
    // Arrange
    let nodes = vec![
        Node::new("admin", "ADM"),
        Node::new("q", "Q").with_sponsor("p").with_team(["r"]),
        Node::new("p", "P").with_sponsor("r").with_team(["q"]),
        Node::new("r", "R").with_sponsor("q").with_team(["p"]),
    ];

    // Act
    let issues = analyze(&nodes, &options);

    // Assert
    let cycles: Vec<_> = issues
        .iter()
        .filter(|i| matches!(i.kind, IssueKind::Cycle { .. }))
        .collect();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].node_id, "p");
    assert_eq!(
        cycles[0].kind,
        IssueKind::Cycle {
            members: vec!["p".into(), "r".into(), "q".into()]
        }
    );
}

#[rstest]
fn given_shared_referral_code_when_analyzing_then_reports_all_holders(options: AnalyzerOptions) {
    let mut nodes = healthy();
    nodes[3].referral_code = "BBB".into();

    let issues = analyze(&nodes, &options);

    assert_eq!(issues.len(), 1);
    assert_eq!(
        issues[0].kind,
        IssueKind::DuplicateReferralCode {
            code: "BBB".into(),
            holder_ids: vec!["b".into(), "c".into()],
        }
    );
}

#[rstest]
fn given_inconsistent_depths_when_analyzing_then_low_severity_drift(options: AnalyzerOptions) {
    let mut nodes = healthy();
    nodes[1].depth = Some(1);
    nodes[3].depth = Some(5);

    let issues = analyze(&nodes, &options);

    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, Severity::Low);
    assert_eq!(
        issues[0].kind,
        IssueKind::DepthDrift {
            expected: 2,
            actual: 5
        }
    );
}

#[rstest]
fn given_mixed_defects_when_analyzing_then_ordered_most_severe_first(options: AnalyzerOptions) {
    let mut nodes = healthy();
    nodes[1].team.clear(); // c: sponsorTeamMismatch (medium)
    nodes.push(Node::new("lost", "LOST")); // orphan (high)
    nodes.push(Node::new("y", "YYY").with_sponsor("zzz-unknown")); // brokenSponsor (critical)

    let issues = analyze(&nodes, &options);

    let severities: Vec<Severity> = issues.iter().map(|i| i.severity).collect();
    let mut sorted = severities.clone();
    sorted.sort();
    assert_eq!(severities, sorted);
    assert_eq!(severities.first(), Some(&Severity::Critical));
    assert_eq!(severities.last(), Some(&Severity::Medium));
}
