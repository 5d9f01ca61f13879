//! Order quoting service
//!
//! Derives referrer and upline for a buyer from a fresh snapshot, then hands
//! the request to the pure commission engine.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::ApplicationResult;
use crate::config::Settings;
use crate::domain::{calc_order, DomainError, GraphIndex, OrderQuote, OrderRequest, Product};
use crate::infrastructure::traits::GraphStore;

/// A quote together with the request it was computed from.
#[derive(Debug, Clone)]
pub struct QuotedOrder {
    pub request: OrderRequest,
    pub quote: OrderQuote,
}

/// Service for computing order payouts.
pub struct OrderService {
    store: Arc<dyn GraphStore>,
    settings: Arc<Settings>,
}

impl OrderService {
    /// Create a new order service.
    pub fn new(store: Arc<dyn GraphStore>, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    /// Quote an order of `sku` placed by `buyer_id`.
    ///
    /// Partners pay their own upline. Guests pay their sponsor as referrer
    /// (`L0`) and the referrer's upline. A sponsor id that does not resolve
    /// is treated as no referrer.
    #[instrument(skip(self, product))]
    pub fn quote(
        &self,
        buyer_id: &str,
        sku: &str,
        product: Option<Product>,
    ) -> ApplicationResult<QuotedOrder> {
        let snapshot = self.store.list_all()?;
        let index = GraphIndex::new(&snapshot);
        let buyer = index
            .get(buyer_id)
            .ok_or_else(|| DomainError::NodeNotFound(buyer_id.to_string()))?;

        let (referrer_id, upline) = if buyer.is_partner() {
            (None, index.upline(buyer_id, self.settings.partner_upline_depth()))
        } else {
            let referrer = buyer
                .sponsor_id
                .as_deref()
                .filter(|id| index.contains(id))
                .map(str::to_string);
            let upline = referrer
                .as_deref()
                .map(|r| index.upline(r, self.settings.guest_upline_depth()))
                .unwrap_or_default();
            (referrer, upline)
        };

        let request = OrderRequest {
            buyer_id: Some(buyer_id.to_string()),
            buyer_is_partner: buyer.is_partner(),
            sku: sku.to_string(),
            product,
            referrer_id,
            upline,
        };
        let quote = calc_order(&self.settings.catalog(), &request);
        debug!(
            "quote: buyer={} price={} payouts={} total={}",
            buyer_id,
            quote.price,
            quote.payouts.len(),
            quote.total_commission()
        );
        Ok(QuotedOrder { request, quote })
    }
}
