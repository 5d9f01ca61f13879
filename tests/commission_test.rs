//! Tests for the commission engine: table resolution, price selection, payouts

use std::collections::BTreeMap;

use rstest::rstest;

use sponsorgraph::domain::{
    calc_order, find_upline, CommissionCatalog, CommissionTable, Level, Node, OrderRequest,
    Payout, Product,
};

fn guest_request(referrer: Option<&str>, upline: &[&str]) -> OrderRequest {
    OrderRequest {
        buyer_id: Some("guest-1".into()),
        buyer_is_partner: false,
        sku: "H2-1".into(),
        product: None,
        referrer_id: referrer.map(str::to_string),
        upline: upline.iter().map(|s| s.to_string()).collect(),
    }
}

fn partner_request(sku: &str, upline: &[&str]) -> OrderRequest {
    OrderRequest {
        buyer_is_partner: true,
        sku: sku.into(),
        referrer_id: None,
        ..guest_request(None, upline)
    }
}

// ============================================================
// calc_order() payout levels
// ============================================================

#[test]
fn given_guest_purchase_with_full_upline_when_calculating_then_pays_l0_to_l3() {
    // Arrange
    let catalog = CommissionCatalog::default();
    let request = guest_request(Some("A"), &["B", "C", "D"]);

    // Act
    let quote = calc_order(&catalog, &request);

    // Assert
    assert_eq!(quote.price, 6500);
    assert_eq!(
        quote.payouts,
        vec![
            Payout::new("A", Level::L0, 1600),
            Payout::new("B", Level::L1, 900),
            Payout::new("C", Level::L2, 500),
            Payout::new("D", Level::L3, 200),
        ]
    );
}

#[test]
fn given_guest_purchase_with_short_upline_when_calculating_then_omits_missing_levels() {
    let catalog = CommissionCatalog::default();
    let request = guest_request(Some("A"), &["B"]);

    let quote = calc_order(&catalog, &request);

    assert_eq!(
        quote.payouts,
        vec![
            Payout::new("A", Level::L0, 1600),
            Payout::new("B", Level::L1, 900),
        ]
    );
}

#[test]
fn given_partner_purchase_when_calculating_then_never_pays_l0() {
    let catalog = CommissionCatalog::default();
    let request = partner_request("H2-1", &["B", "C", "D"]);

    let quote = calc_order(&catalog, &request);

    assert_eq!(quote.price, 4900);
    assert_eq!(
        quote.payouts,
        vec![
            Payout::new("B", Level::L1, 900),
            Payout::new("C", Level::L2, 500),
            Payout::new("D", Level::L3, 200),
        ]
    );
    assert!(quote.payouts.iter().all(|p| p.level != Level::L0));
}

#[test]
fn given_guest_without_referrer_when_calculating_then_skips_l0_only() {
    let catalog = CommissionCatalog::default();
    let request = guest_request(None, &["B", "C"]);

    let quote = calc_order(&catalog, &request);

    assert_eq!(quote.payouts.len(), 2);
    assert_eq!(quote.payouts[0].level, Level::L1);
}

#[test]
fn given_empty_upline_slot_when_calculating_then_level_is_skipped() {
    let catalog = CommissionCatalog::default();
    let request = guest_request(Some("A"), &["B", "", "D"]);

    let quote = calc_order(&catalog, &request);

    let levels: Vec<Level> = quote.payouts.iter().map(|p| p.level).collect();
    assert_eq!(levels, vec![Level::L0, Level::L1, Level::L3]);
}

// ============================================================
// Table resolution and price selection
// ============================================================

#[test]
fn given_unknown_sku_when_calculating_then_falls_back_to_default_sku() {
    let catalog = CommissionCatalog::default();
    let request = partner_request("NOPE-9", &["B"]);

    let quote = calc_order(&catalog, &request);

    assert_eq!(quote.price, 4900);
    assert_eq!(quote.payouts, vec![Payout::new("B", Level::L1, 900)]);
}

#[test]
fn given_product_override_table_when_calculating_then_override_wins() {
    // Arrange
    let catalog = CommissionCatalog::default();
    let mut partner = BTreeMap::new();
    partner.insert(Level::L1, 100);
    partner.insert(Level::L4, 40);
    let product = Product {
        sku: "H2-1".into(),
        retail_price: None,
        partner_price: Some(4000),
        commissions: Some(CommissionTable {
            guest: BTreeMap::new(),
            partner,
        }),
    };
    let mut request = partner_request("H2-1", &["B", "C", "D", "E", "F"]);
    request.product = Some(product);

    // Act
    let quote = calc_order(&catalog, &request);

    // Assert
    assert_eq!(quote.price, 4000);
    assert_eq!(
        quote.payouts,
        vec![
            Payout::new("B", Level::L1, 100),
            Payout::new("E", Level::L4, 40),
        ]
    );
}

#[test]
fn given_empty_override_table_when_resolving_then_uses_sku_defaults() {
    let catalog = CommissionCatalog::default();
    let product = Product {
        sku: "H2-1".into(),
        commissions: Some(CommissionTable::default()),
        ..Product::default()
    };

    let table = catalog.resolve_commissions("H2-1", Some(&product));

    assert_eq!(table.guest.get(&Level::L0), Some(&1600));
}

#[test]
fn given_empty_catalog_when_calculating_then_degrades_to_nothing() {
    let catalog = CommissionCatalog::new("H2-1", BTreeMap::new());
    let request = guest_request(Some("A"), &["B"]);

    let quote = calc_order(&catalog, &request);

    assert_eq!(quote.price, 0);
    assert!(quote.payouts.is_empty());
}

#[rstest]
#[case(true, 4900)]
#[case(false, 6500)]
fn given_buyer_kind_when_pricing_then_selects_matching_price(
    #[case] buyer_is_partner: bool,
    #[case] expected: u64,
) {
    let catalog = CommissionCatalog::default();
    assert_eq!(catalog.price("H2-1", None, buyer_is_partner), expected);
}

// ============================================================
// Determinism and fingerprint
// ============================================================

#[test]
fn given_identical_requests_when_calculating_twice_then_results_and_fingerprints_match() {
    let catalog = CommissionCatalog::default();
    let request = guest_request(Some("A"), &["B", "C", "D"]);

    let first = calc_order(&catalog, &request);
    let second = calc_order(&catalog, &request);

    assert_eq!(first, second);
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert_eq!(first.fingerprint().len(), 64);
}

#[test]
fn given_different_recipients_when_fingerprinting_then_differs() {
    let catalog = CommissionCatalog::default();

    let a = calc_order(&catalog, &guest_request(Some("A"), &["B"]));
    let b = calc_order(&catalog, &guest_request(Some("A"), &["C"]));

    assert_ne!(a.fingerprint(), b.fingerprint());
}

// ============================================================
// Upline feeding the engine
// ============================================================

#[test]
fn given_chain_from_graph_when_calculating_then_pays_walked_ancestors() {
    // Arrange
    let nodes = vec![
        Node::new("root", "R").with_team(["p1"]),
        Node::new("p1", "P1").with_sponsor("root").with_team(["p2"]),
        Node::new("p2", "P2").with_sponsor("p1").with_team(["buyer"]),
        Node::new("buyer", "BUY").with_sponsor("p2"),
    ];
    let upline = find_upline("buyer", &nodes, 3);

    // Act
    let quote = calc_order(
        &CommissionCatalog::default(),
        &OrderRequest {
            buyer_id: Some("buyer".into()),
            buyer_is_partner: true,
            sku: "H2-1".into(),
            product: None,
            referrer_id: None,
            upline,
        },
    );

    // Assert
    let recipients: Vec<&str> = quote.payouts.iter().map(|p| p.recipient_id.as_str()).collect();
    assert_eq!(recipients, vec!["p2", "p1", "root"]);
}
