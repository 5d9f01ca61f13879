//! Commission table resolution and order payout distribution.
//!
//! Everything here is a pure function of its inputs: no clock, no randomness,
//! no I/O. Identical inputs produce identical quotes, which is what audit
//! replay relies on.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::domain::entities::{
    CommissionTable, Level, OrderQuote, OrderRequest, Payout, Product, SkuDefaults,
};

/// SKU whose defaults apply when a product's own SKU is unknown.
pub const DEFAULT_SKU: &str = "H2-1";

/// Number of ancestor levels paid on a guest purchase (L1..L3).
pub const GUEST_ANCESTOR_LEVELS: usize = 3;

/// Default prices and commission tables keyed by SKU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionCatalog {
    default_sku: String,
    skus: BTreeMap<String, SkuDefaults>,
}

impl Default for CommissionCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_SKU, builtin_skus())
    }
}

/// Compiled-in catalog defaults.
pub fn builtin_skus() -> BTreeMap<String, SkuDefaults> {
    let mut skus = BTreeMap::new();
    skus.insert(
        DEFAULT_SKU.to_string(),
        SkuDefaults {
            retail_price: 6500,
            partner_price: 4900,
            commissions: CommissionTable {
                guest: BTreeMap::from([(Level::L0, 1600)]),
                partner: BTreeMap::from([(Level::L1, 900), (Level::L2, 500), (Level::L3, 200)]),
            },
        },
    );
    skus
}

impl CommissionCatalog {
    pub fn new(default_sku: impl Into<String>, skus: BTreeMap<String, SkuDefaults>) -> Self {
        Self {
            default_sku: default_sku.into(),
            skus,
        }
    }

    pub fn default_sku(&self) -> &str {
        &self.default_sku
    }

    /// Defaults for `sku`, falling back to the designated default SKU.
    pub fn defaults_for(&self, sku: &str) -> Option<&SkuDefaults> {
        self.skus
            .get(sku)
            .or_else(|| self.skus.get(&self.default_sku))
    }

    /// Resolve the commission table for an order.
    ///
    /// A non-empty product override wins. Otherwise the catalog table for the
    /// SKU (or the default SKU) applies. Missing data yields an empty table.
    pub fn resolve_commissions(&self, sku: &str, product: Option<&Product>) -> CommissionTable {
        if let Some(table) = product.and_then(|p| p.commissions.as_ref()) {
            if !table.is_empty() {
                return table.clone();
            }
        }
        let sku = product
            .map(|p| p.sku.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(sku);
        self.defaults_for(sku)
            .map(|d| d.commissions.clone())
            .unwrap_or_default()
    }

    /// Price for the buyer type: product override first, then catalog default.
    pub fn price(&self, sku: &str, product: Option<&Product>, buyer_is_partner: bool) -> u64 {
        let overridden = product.and_then(|p| {
            if buyer_is_partner {
                p.partner_price
            } else {
                p.retail_price
            }
        });
        if let Some(price) = overridden {
            return price;
        }
        let sku = product
            .map(|p| p.sku.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(sku);
        self.defaults_for(sku)
            .map(|d| {
                if buyer_is_partner {
                    d.partner_price
                } else {
                    d.retail_price
                }
            })
            .unwrap_or(0)
    }
}

/// Compute price and payouts for one order.
///
/// Guest purchase: `L0` to the referrer, then `L1..L3` to `upline[0..3]`.
/// Partner purchase: `L1..L5` to `upline[0..5]`, never `L0`.
/// A level is omitted when its table entry is missing or zero, or when the
/// recipient slot is missing or empty.
pub fn calc_order(catalog: &CommissionCatalog, request: &OrderRequest) -> OrderQuote {
    let product = request.product.as_ref();
    let table = catalog.resolve_commissions(&request.sku, product);
    let price = catalog.price(&request.sku, product, request.buyer_is_partner);

    let mut payouts = Vec::new();
    if request.buyer_is_partner {
        pay_ancestors(&table.partner, &request.upline, Level::ANCESTORS.len(), &mut payouts);
    } else {
        let referrer = request.referrer_id.as_deref().filter(|id| !id.is_empty());
        if let (Some(referrer), Some(&amount)) = (referrer, table.guest.get(&Level::L0)) {
            if amount > 0 {
                payouts.push(Payout::new(referrer, Level::L0, amount));
            }
        }
        pay_ancestors(&table.partner, &request.upline, GUEST_ANCESTOR_LEVELS, &mut payouts);
    }

    OrderQuote { price, payouts }
}

fn pay_ancestors(
    table: &BTreeMap<Level, u64>,
    upline: &[String],
    levels: usize,
    payouts: &mut Vec<Payout>,
) {
    for (slot, level) in Level::ANCESTORS.iter().take(levels).enumerate() {
        let recipient = upline.get(slot).filter(|id| !id.is_empty());
        if let (Some(recipient), Some(&amount)) = (recipient, table.get(level)) {
            if amount > 0 {
                payouts.push(Payout::new(recipient.clone(), *level, amount));
            }
        }
    }
}

impl OrderQuote {
    /// Hex SHA-256 over a canonical rendering of the quote.
    ///
    /// Two quotes have the same fingerprint iff price and payouts (including
    /// their order) are identical.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("price={}\n", self.price));
        for p in &self.payouts {
            hasher.update(format!("{}\t{}\t{}\n", p.level, p.recipient_id, p.amount));
        }
        hex::encode(hasher.finalize())
    }
}
