//! Sponsor suggestions for orphaned nodes, based on invitation codes.

use itertools::Itertools;

use crate::domain::entities::{Confidence, Node, Suggestion};
use crate::domain::traversal::GraphIndex;

/// Propose a sponsor for `orphan`. Never mutates anything.
///
/// - exact `invitation_code == referral_code` match: high confidence
/// - match only after trimming and ASCII case folding: medium confidence
/// - no code, no match, an ambiguous match, the orphan itself, or a candidate
///   below the orphan in the tree (would close a cycle): low, no candidate
pub fn suggest_sponsor(orphan: &Node, nodes: &[Node]) -> Suggestion {
    let Some(code) = orphan
        .invitation_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    else {
        return Suggestion::none("no invitation code recorded");
    };

    let exact = holders(nodes, |rc| rc == code);
    let (matches, confidence) = if exact.is_empty() {
        let loose = holders(nodes, |rc| rc.trim().eq_ignore_ascii_case(code));
        (loose, Confidence::Medium)
    } else {
        (exact, Confidence::High)
    };

    let candidate = match matches.as_slice() {
        [] => {
            return Suggestion::none(format!(
                "invitation code {code} matches no referral code"
            ))
        }
        [single] => *single,
        many => {
            return Suggestion::none(format!(
                "invitation code {code} is held by several nodes: {}",
                many.join(", ")
            ))
        }
    };

    if candidate == orphan.id {
        return Suggestion::none(format!(
            "invitation code {code} is the node's own referral code"
        ));
    }

    let index = GraphIndex::new(nodes);
    if index
        .upline(candidate, index.len())
        .iter()
        .any(|id| *id == orphan.id)
    {
        return Suggestion::none(format!(
            "{candidate} holds code {code} but sits in this node's downline"
        ));
    }

    let reason = match confidence {
        Confidence::High => format!("invitation code {code} is {candidate}'s referral code"),
        _ => format!("invitation code {code} matches {candidate}'s referral code loosely"),
    };
    Suggestion {
        candidate: Some(candidate.to_string()),
        confidence,
        reason,
    }
}

fn holders<'a>(nodes: &'a [Node], matches: impl Fn(&str) -> bool) -> Vec<&'a str> {
    nodes
        .iter()
        .filter(|n| !n.referral_code.is_empty() && matches(&n.referral_code))
        .map(|n| n.id.as_str())
        .unique()
        .collect()
}
