//! Domain entities: core data structures

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an account takes part in the partner program or only buys as a guest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Partner,
    Guest,
}

/// A partner or guest account in the referral graph.
///
/// The parent edge lives in `sponsor_id`, the child edges in `team`. Both are
/// stored, and nothing guarantees they agree; the analyzer reports divergence.
/// Record fields this crate does not own (balances, profile data) are kept in
/// `extra` so read-modify-write never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub sponsor_id: Option<String>,
    #[serde(default)]
    pub team: Vec<String>,
    #[serde(default)]
    pub referral_code: String,
    #[serde(default)]
    pub invitation_code: Option<String>,
    /// Distance from the root. Advisory only.
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, referral_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sponsor_id: None,
            team: Vec::new(),
            referral_code: referral_code.into(),
            invitation_code: None,
            depth: None,
            kind: NodeKind::Partner,
            created_at: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_sponsor(mut self, sponsor_id: impl Into<String>) -> Self {
        self.sponsor_id = Some(sponsor_id.into());
        self
    }

    pub fn with_team<I, S>(mut self, team: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.team = team.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_invitation(mut self, code: impl Into<String>) -> Self {
        self.invitation_code = Some(code.into());
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn registered_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn is_partner(&self) -> bool {
        self.kind == NodeKind::Partner
    }

    /// True if `child_id` appears in this node's team list.
    pub fn lists(&self, child_id: &str) -> bool {
        self.team.iter().any(|c| c == child_id)
    }
}

// ============================================================
// Commission model
// ============================================================

/// Commission level. L0 is the direct-sale bonus on guest purchases,
/// L1..L5 are paid to ancestors 1..5 of the sponsor chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Level {
    L0,
    L1,
    L2,
    L3,
    L4,
    L5,
}

impl Level {
    /// Ancestor levels in chain order: `ANCESTORS[i]` is paid to `upline[i]`.
    pub const ANCESTORS: [Level; 5] = [Level::L1, Level::L2, Level::L3, Level::L4, Level::L5];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::L0 => "L0",
            Level::L1 => "L1",
            Level::L2 => "L2",
            Level::L3 => "L3",
            Level::L4 => "L4",
            Level::L5 => "L5",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        level.as_str().to_string()
    }
}

impl TryFrom<String> for Level {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "L0" => Ok(Level::L0),
            "L1" => Ok(Level::L1),
            "L2" => Ok(Level::L2),
            "L3" => Ok(Level::L3),
            "L4" => Ok(Level::L4),
            "L5" => Ok(Level::L5),
            other => Err(format!("unknown commission level: {other}")),
        }
    }
}

/// Per-level payout amounts for one product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionTable {
    /// Guest purchase table, only `L0` is meaningful.
    pub guest: BTreeMap<Level, u64>,
    /// Ancestor table, `L1..L5`.
    pub partner: BTreeMap<Level, u64>,
}

impl CommissionTable {
    pub fn is_empty(&self) -> bool {
        self.guest.is_empty() && self.partner.is_empty()
    }
}

/// Product as seen by the commission engine. Every field besides `sku` is an
/// optional override of the catalog defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    pub sku: String,
    pub retail_price: Option<u64>,
    pub partner_price: Option<u64>,
    pub commissions: Option<CommissionTable>,
}

/// Catalog defaults for one SKU.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkuDefaults {
    pub retail_price: u64,
    pub partner_price: u64,
    pub commissions: CommissionTable,
}

/// Input of one order calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub buyer_id: Option<String>,
    pub buyer_is_partner: bool,
    pub sku: String,
    pub product: Option<Product>,
    /// Partner who referred a guest buyer (receives L0).
    pub referrer_id: Option<String>,
    /// Ancestor ids, nearest first.
    pub upline: Vec<String>,
}

/// One commission payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub recipient_id: String,
    pub level: Level,
    pub amount: u64,
}

impl Payout {
    pub fn new(recipient_id: impl Into<String>, level: Level, amount: u64) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            level,
            amount,
        }
    }
}

/// Result of an order calculation: the price and the ordered payouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderQuote {
    pub price: u64,
    pub payouts: Vec<Payout>,
}

impl OrderQuote {
    pub fn total_commission(&self) -> u64 {
        self.payouts.iter().map(|p| p.amount).sum()
    }
}

// ============================================================
// Integrity model
// ============================================================

/// Issue severity, ordered most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        };
        f.write_str(s)
    }
}

/// One record among several sharing the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRecord {
    /// Position in the snapshot.
    pub index: usize,
    pub referral_code: String,
}

/// Structural defect type, carrying its evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IssueKind {
    /// Non-root node without a sponsor.
    #[serde(rename_all = "camelCase")]
    Orphan {
        team_size: usize,
        registered_recently: bool,
    },
    /// `sponsor_id` points at an id that does not exist.
    #[serde(rename_all = "camelCase")]
    BrokenSponsor {
        missing_sponsor_id: String,
        /// Existing ids close to the missing one (typo or rename targets).
        similar_ids: Vec<String>,
    },
    /// A team entry of the issue's node references a missing id.
    #[serde(rename_all = "camelCase")]
    MissingChild { missing_child_id: String },
    /// The issue's node is listed in `listed_by`'s team but points elsewhere.
    #[serde(rename_all = "camelCase")]
    TeamSponsorMismatch {
        listed_by: String,
        current_sponsor_id: Option<String>,
    },
    /// The issue's node points at `sponsor_id`, which does not list it.
    #[serde(rename_all = "camelCase")]
    SponsorTeamMismatch { sponsor_id: String },
    #[serde(rename_all = "camelCase")]
    DuplicateId { records: Vec<DuplicateRecord> },
    #[serde(rename_all = "camelCase")]
    DuplicateReferralCode { code: String, holder_ids: Vec<String> },
    /// Sponsor chain loops back on itself; members in walk order.
    #[serde(rename_all = "camelCase")]
    Cycle { members: Vec<String> },
    #[serde(rename_all = "camelCase")]
    DepthDrift { expected: u32, actual: u32 },
}

impl IssueKind {
    pub fn name(&self) -> &'static str {
        match self {
            IssueKind::Orphan { .. } => "orphan",
            IssueKind::BrokenSponsor { .. } => "brokenSponsor",
            IssueKind::MissingChild { .. } => "missingChild",
            IssueKind::TeamSponsorMismatch { .. } => "teamSponsorMismatch",
            IssueKind::SponsorTeamMismatch { .. } => "sponsorTeamMismatch",
            IssueKind::DuplicateId { .. } => "duplicateId",
            IssueKind::DuplicateReferralCode { .. } => "duplicateReferralCode",
            IssueKind::Cycle { .. } => "cycle",
            IssueKind::DepthDrift { .. } => "depthDrift",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            IssueKind::BrokenSponsor { .. }
            | IssueKind::DuplicateId { .. }
            | IssueKind::DuplicateReferralCode { .. }
            | IssueKind::Cycle { .. } => Severity::Critical,
            IssueKind::Orphan { .. }
            | IssueKind::MissingChild { .. }
            | IssueKind::TeamSponsorMismatch { .. } => Severity::High,
            IssueKind::SponsorTeamMismatch { .. } => Severity::Medium,
            IssueKind::DepthDrift { .. } => Severity::Low,
        }
    }
}

/// A structural defect found by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(flatten)]
    pub kind: IssueKind,
    pub severity: Severity,
    pub node_id: String,
    pub description: String,
}

impl Issue {
    pub fn new(node_id: impl Into<String>, kind: IssueKind, description: impl Into<String>) -> Self {
        Self {
            severity: kind.severity(),
            kind,
            node_id: node_id.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.severity,
            self.kind.name(),
            self.node_id,
            self.description
        )
    }
}

/// Confidence of a sponsor suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        };
        f.write_str(s)
    }
}

/// Proposed sponsor for an orphaned node. Never applied by itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub candidate: Option<String>,
    pub confidence: Confidence,
    pub reason: String,
}

impl Suggestion {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            candidate: None,
            confidence: Confidence::Low,
            reason: reason.into(),
        }
    }

    /// Candidate id if confidence is good enough to act on with confirmation.
    pub fn actionable(&self) -> Option<&str> {
        match self.confidence {
            Confidence::High | Confidence::Medium => self.candidate.as_deref(),
            Confidence::Low => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_severities_when_sorted_then_critical_comes_first() {
        let mut all = vec![Severity::Low, Severity::High, Severity::Critical, Severity::Medium];
        all.sort();
        assert_eq!(
            all,
            vec![Severity::Critical, Severity::High, Severity::Medium, Severity::Low]
        );
    }

    #[test]
    fn given_level_strings_when_parsing_then_accepts_any_case() {
        assert_eq!(Level::try_from("l3".to_string()), Ok(Level::L3));
        assert_eq!(Level::try_from(" L0 ".to_string()), Ok(Level::L0));
        assert!(Level::try_from("L9".to_string()).is_err());
    }

    #[test]
    fn given_record_with_unknown_fields_when_round_tripped_then_keeps_them() {
        let json = r#"{"id":"u1","sponsorId":"root","team":[],"referralCode":"C1","balance":1200}"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.sponsor_id.as_deref(), Some("root"));
        assert_eq!(node.extra.get("balance"), Some(&serde_json::json!(1200)));

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["balance"], serde_json::json!(1200));
        assert_eq!(back["referralCode"], serde_json::json!("C1"));
    }

    #[test]
    fn given_issue_when_serialized_then_carries_type_tag_and_evidence() {
        let issue = Issue::new(
            "x",
            IssueKind::SponsorTeamMismatch {
                sponsor_id: "s".into(),
            },
            "not listed",
        );
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["type"], "sponsorTeamMismatch");
        assert_eq!(value["sponsorId"], "s");
        assert_eq!(value["severity"], "medium");
        assert_eq!(value["nodeId"], "x");
    }
}
