//! Graph integrity analysis.
//!
//! One pass indexes the snapshot by id, one pass walks every team list, one
//! pass checks every sponsor pointer and one colors sponsor chains for cycles.
//! Total work is O(N + E). Nothing here fails: corrupt input is what this
//! module exists to describe.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;

use crate::domain::entities::{DuplicateRecord, Issue, IssueKind, Node};
use crate::domain::traversal::GraphIndex;

/// Tunables for one analysis run. `now` is explicit so results are reproducible.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Ids exempt from orphan detection.
    pub root_ids: Vec<String>,
    /// Orphans registered within this window are flagged as recent.
    pub recent_orphan_window: Duration,
    /// Max edit distance for "similar id" evidence on broken sponsors.
    pub similar_id_max_distance: usize,
    pub now: DateTime<Utc>,
}

impl AnalyzerOptions {
    pub fn new<I, S>(root_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root_ids: root_ids.into_iter().map(Into::into).collect(),
            recent_orphan_window: Duration::days(30),
            similar_id_max_distance: 2,
            now: Utc::now(),
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Scan a snapshot and return its structural issues, most severe first.
pub fn analyze(nodes: &[Node], options: &AnalyzerOptions) -> Vec<Issue> {
    let index = GraphIndex::new(nodes);
    let roots: HashSet<&str> = options.root_ids.iter().map(String::as_str).collect();
    let mut issues = Vec::new();

    // Records that own their id; later duplicates are only reported, not re-checked.
    let mut primary: Vec<&Node> = Vec::with_capacity(nodes.len());
    let mut occurrences: HashMap<&str, Vec<usize>> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        let seen = occurrences.entry(node.id.as_str()).or_default();
        if seen.is_empty() {
            primary.push(node);
        }
        seen.push(i);
    }

    detect_duplicate_ids(nodes, &primary, &occurrences, &mut issues);
    detect_duplicate_codes(&primary, &mut issues);

    // (sponsor, child) pairs present in team lists
    let mut listed: HashSet<(&str, &str)> = HashSet::new();
    for parent in &primary {
        for child_id in &parent.team {
            listed.insert((parent.id.as_str(), child_id.as_str()));
            let Some(child) = index.get(child_id) else {
                issues.push(Issue::new(
                    &parent.id,
                    IssueKind::MissingChild {
                        missing_child_id: child_id.clone(),
                    },
                    format!("team lists {child_id}, which does not exist"),
                ));
                continue;
            };
            if child.sponsor_id.as_deref() != Some(parent.id.as_str()) {
                let current = child.sponsor_id.clone();
                issues.push(Issue::new(
                    &child.id,
                    IssueKind::TeamSponsorMismatch {
                        listed_by: parent.id.clone(),
                        current_sponsor_id: current.clone(),
                    },
                    format!(
                        "listed in {}'s team but sponsorId is {}",
                        parent.id,
                        current.as_deref().unwrap_or("null")
                    ),
                ));
            }
        }
    }

    for node in &primary {
        match node.sponsor_id.as_deref() {
            None => {
                if !roots.contains(node.id.as_str()) {
                    issues.push(orphan_issue(node, options));
                }
            }
            Some(sponsor_id) => match index.get(sponsor_id) {
                None => {
                    let similar = similar_ids(
                        sponsor_id,
                        &node.id,
                        index.ids(),
                        options.similar_id_max_distance,
                    );
                    issues.push(Issue::new(
                        &node.id,
                        IssueKind::BrokenSponsor {
                            missing_sponsor_id: sponsor_id.to_string(),
                            similar_ids: similar,
                        },
                        format!("sponsorId {sponsor_id} does not exist"),
                    ));
                }
                Some(sponsor) => {
                    if sponsor.id != node.id && !listed.contains(&(sponsor_id, node.id.as_str())) {
                        issues.push(Issue::new(
                            &node.id,
                            IssueKind::SponsorTeamMismatch {
                                sponsor_id: sponsor_id.to_string(),
                            },
                            format!("sponsor {sponsor_id} does not list this node in its team"),
                        ));
                    }
                    if let (Some(actual), Some(sponsor_depth)) = (node.depth, sponsor.depth) {
                        let expected = sponsor_depth.saturating_add(1);
                        if actual != expected {
                            issues.push(Issue::new(
                                &node.id,
                                IssueKind::DepthDrift { expected, actual },
                                format!("depth is {actual}, sponsor depth implies {expected}"),
                            ));
                        }
                    }
                }
            },
        }
    }

    detect_cycles(&primary, &index, &mut issues);

    issues.sort_by_key(|issue| issue.severity);
    issues
}

fn orphan_issue(node: &Node, options: &AnalyzerOptions) -> Issue {
    let registered_recently = node
        .created_at
        .map(|at| at <= options.now && options.now - at <= options.recent_orphan_window)
        .unwrap_or(false);
    let mut description = String::from("no sponsor");
    if !node.team.is_empty() {
        description.push_str(&format!(", has {} team member(s)", node.team.len()));
    }
    if registered_recently {
        description.push_str(", registered recently");
    }
    Issue::new(
        &node.id,
        IssueKind::Orphan {
            team_size: node.team.len(),
            registered_recently,
        },
        description,
    )
}

fn detect_duplicate_ids(
    nodes: &[Node],
    primary: &[&Node],
    occurrences: &HashMap<&str, Vec<usize>>,
    issues: &mut Vec<Issue>,
) {
    for node in primary {
        let Some(positions) = occurrences.get(node.id.as_str()) else {
            continue;
        };
        if positions.len() < 2 {
            continue;
        }
        let records = positions
            .iter()
            .map(|&index| DuplicateRecord {
                index,
                referral_code: nodes[index].referral_code.clone(),
            })
            .collect::<Vec<_>>();
        issues.push(Issue::new(
            &node.id,
            IssueKind::DuplicateId { records },
            format!("{} records share this id", positions.len()),
        ));
    }
}

fn detect_duplicate_codes(primary: &[&Node], issues: &mut Vec<Issue>) {
    let holders = primary
        .iter()
        .filter(|n| !n.referral_code.is_empty())
        .map(|n| (n.referral_code.as_str(), n.id.as_str()))
        .into_group_map();

    for (code, ids) in holders
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .sorted_by(|a, b| a.0.cmp(b.0))
    {
        let holder_ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        issues.push(Issue::new(
            holder_ids[0].clone(),
            IssueKind::DuplicateReferralCode {
                code: code.to_string(),
                holder_ids: holder_ids.clone(),
            },
            format!("referral code {code} is held by {}", holder_ids.join(", ")),
        ));
    }
}

/// Report each sponsor cycle once, anchored at its smallest id.
fn detect_cycles(primary: &[&Node], index: &GraphIndex<'_>, issues: &mut Vec<Issue>) {
    let mut done: HashSet<&str> = HashSet::new();

    for start in primary {
        if done.contains(start.id.as_str()) {
            continue;
        }
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashMap<&str, usize> = HashMap::new();
        let mut current = Some(*start);

        while let Some(node) = current {
            let id = node.id.as_str();
            if done.contains(id) {
                break;
            }
            if let Some(&pos) = on_path.get(id) {
                let members = rotate_to_min(&path[pos..]);
                let anchor = members[0].clone();
                issues.push(Issue::new(
                    anchor,
                    IssueKind::Cycle {
                        members: members.clone(),
                    },
                    format!("sponsor chain loops: {}", members.join(" -> ")),
                ));
                break;
            }
            on_path.insert(id, path.len());
            path.push(id);
            current = node.sponsor_id.as_deref().and_then(|s| index.get(s));
        }
        done.extend(path);
    }
}

fn rotate_to_min(cycle: &[&str]) -> Vec<String> {
    let start = cycle.iter().position_min().unwrap_or(0);
    cycle[start..]
        .iter()
        .chain(cycle[..start].iter())
        .map(|s| s.to_string())
        .collect()
}

/// Existing ids within `max_distance` edits of `missing`, closest first.
/// Case-insensitive equality counts as distance zero.
fn similar_ids<'a>(
    missing: &str,
    exclude: &str,
    ids: impl Iterator<Item = &'a str>,
    max_distance: usize,
) -> Vec<String> {
    let target = missing.to_lowercase();
    ids.filter(|id| *id != exclude)
        .filter_map(|id| {
            let d = strsim::levenshtein(&target, &id.to_lowercase());
            (d <= max_distance).then_some((d, id))
        })
        .sorted()
        .map(|(_, id)| id.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Severity;

    fn options() -> AnalyzerOptions {
        AnalyzerOptions::new(["root"])
    }

    fn healthy() -> Vec<Node> {
        vec![
            Node::new("root", "R").with_team(["a", "b"]).with_depth(0),
            Node::new("a", "A").with_sponsor("root").with_team(["c"]).with_depth(1),
            Node::new("b", "B").with_sponsor("root").with_depth(1),
            Node::new("c", "C").with_sponsor("a").with_depth(2),
        ]
    }

    #[test]
    fn given_consistent_graph_when_analyzing_then_reports_nothing() {
        assert!(analyze(&healthy(), &options()).is_empty());
    }

    #[test]
    fn given_unlisted_root_without_sponsor_when_analyzing_then_reports_orphan() {
        let issues = analyze(&healthy(), &AnalyzerOptions::new(Vec::<String>::new()));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind.name(), "orphan");
        assert_eq!(issues[0].severity, Severity::High);
        assert_eq!(
            issues[0].kind,
            IssueKind::Orphan {
                team_size: 2,
                registered_recently: false
            }
        );
    }

    #[test]
    fn given_recent_orphan_when_analyzing_then_flags_registration_window() {
        let now = Utc::now();
        let mut nodes = healthy();
        nodes.push(Node::new("new", "N").registered_at(now - Duration::days(2)));
        nodes.push(Node::new("old", "O").registered_at(now - Duration::days(90)));

        let issues = analyze(&nodes, &options().at(now));

        let flags: Vec<(String, bool)> = issues
            .iter()
            .filter_map(|i| match &i.kind {
                IssueKind::Orphan {
                    registered_recently,
                    ..
                } => Some((i.node_id.clone(), *registered_recently)),
                _ => None,
            })
            .collect();
        assert_eq!(flags, vec![("new".to_string(), true), ("old".to_string(), false)]);
    }

    #[test]
    fn given_team_entry_pointing_elsewhere_when_analyzing_then_reports_both_sides() {
        let nodes = vec![
            Node::new("root", "R").with_team(["a", "b", "c"]),
            Node::new("a", "A").with_sponsor("root"),
            Node::new("b", "B").with_sponsor("root").with_team(["c"]),
            Node::new("c", "C").with_sponsor("a"),
        ];

        let issues = analyze(&nodes, &options());

        let kinds: Vec<&str> = issues.iter().map(|i| i.kind.name()).collect();
        assert_eq!(
            kinds,
            vec!["teamSponsorMismatch", "teamSponsorMismatch", "sponsorTeamMismatch"]
        );
        assert_eq!(
            issues[0].kind,
            IssueKind::TeamSponsorMismatch {
                listed_by: "root".into(),
                current_sponsor_id: Some("a".into())
            }
        );
        assert_eq!(issues[2].node_id, "c");
    }

    #[test]
    fn given_self_sponsor_when_analyzing_then_reports_single_cycle() {
        let mut nodes = healthy();
        nodes.push(Node::new("s", "S").with_sponsor("s").with_team(["s"]));

        let issues = analyze(&nodes, &options());

        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].kind,
            IssueKind::Cycle {
                members: vec!["s".into()]
            }
        );
    }

    #[test]
    fn given_three_node_loop_when_analyzing_then_anchors_cycle_at_smallest_id() {
        let nodes = vec![
            Node::new("z", "Z").with_sponsor("y").with_team(["x"]),
            Node::new("y", "Y").with_sponsor("x").with_team(["z"]),
            Node::new("x", "X").with_sponsor("z").with_team(["y"]),
        ];

        let issues = analyze(&nodes, &options());

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].node_id, "x");
        assert_eq!(
            issues[0].kind,
            IssueKind::Cycle {
                members: vec!["x".into(), "z".into(), "y".into()]
            }
        );
    }

    #[test]
    fn given_shared_referral_code_when_analyzing_then_lists_all_holders() {
        let mut nodes = healthy();
        nodes[3].referral_code = "A".into();

        let issues = analyze(&nodes, &options());

        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].kind,
            IssueKind::DuplicateReferralCode {
                code: "A".into(),
                holder_ids: vec!["a".into(), "c".into()]
            }
        );
    }

    #[test]
    fn given_depth_drift_when_analyzing_then_reports_low_severity_last() {
        let mut nodes = healthy();
        nodes[3].depth = Some(7);
        nodes[2].sponsor_id = Some("nobody".into());

        let issues = analyze(&nodes, &options());

        assert_eq!(issues.first().map(|i| i.severity), Some(Severity::Critical));
        assert_eq!(issues.last().map(|i| i.severity), Some(Severity::Low));
        assert_eq!(
            issues.last().map(|i| &i.kind),
            Some(&IssueKind::DepthDrift {
                expected: 2,
                actual: 7
            })
        );
    }

    #[test]
    fn given_typo_in_sponsor_id_when_analyzing_then_suggests_similar_ids() {
        let mut nodes = healthy();
        nodes[3].sponsor_id = Some("A".into());

        let issues = analyze(&nodes, &options());

        let broken = issues
            .iter()
            .find(|i| i.kind.name() == "brokenSponsor")
            .unwrap();
        match &broken.kind {
            IssueKind::BrokenSponsor { similar_ids, .. } => {
                assert_eq!(similar_ids, &vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn given_transposed_digits_when_analyzing_then_similar_within_two_edits() {
        let nodes = vec![
            Node::new("root", "R").with_team(["user-17", "c"]),
            Node::new("user-17", "U17").with_sponsor("root"),
            Node::new("c", "C").with_sponsor("user-71"),
        ];

        let issues = analyze(&nodes, &options());

        let broken = issues
            .iter()
            .find(|i| i.kind.name() == "brokenSponsor")
            .unwrap();
        match &broken.kind {
            IssueKind::BrokenSponsor { similar_ids, .. } => {
                assert_eq!(similar_ids, &vec!["user-17".to_string()]);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }
}
