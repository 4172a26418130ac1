use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::constants::collection;
use crate::error::Result;
use crate::models::market::ClosedStatistics;
use crate::models::{Order, SyncConfig};
use crate::services::batch_orchestrator::SyncJob;
use crate::services::market_api::MarketApi;
use crate::services::price_calculator::{calculate_prices, PriceOptions};
use crate::services::resilient_client::FetchError;
use crate::services::store::{into_document, Document, Filter, Sort, Store};
use crate::utils::round2;

/// Stored item to price
#[derive(Debug, Clone, PartialEq)]
pub struct PricedItem {
    pub url_name: String,
    /// Rank-bearing items are priced at their max rank
    pub rank: Option<u8>,
}

impl PricedItem {
    fn from_document(doc: &Document) -> Option<Self> {
        let url_name = doc.get("url_name")?.as_str()?.to_string();
        let rank = doc
            .get("mod_max_rank")
            .and_then(Value::as_u64)
            .and_then(|r| u8::try_from(r).ok());
        Some(Self { url_name, rank })
    }
}

/// Order-book prices for every stored item. Always refreshes; only price
/// fields are written so catalog fields survive.
pub struct PriceJob {
    api: Arc<MarketApi>,
    store: Arc<dyn Store>,
    status_fallback: Vec<String>,
    avg_depth: usize,
}

impl PriceJob {
    pub fn new(api: Arc<MarketApi>, store: Arc<dyn Store>, config: &SyncConfig) -> Self {
        Self {
            api,
            store,
            status_fallback: config.status_fallback.clone(),
            avg_depth: config.price_avg_depth,
        }
    }

    /// Price fields for one item
    pub fn price_document(&self, item: &PricedItem, orders: &[Order], statistics: &ClosedStatistics) -> Document {
        let options = PriceOptions {
            status_fallback: &self.status_fallback,
            rank: item.rank,
            avg_depth: self.avg_depth,
        };
        let prices = calculate_prices(orders, &options);

        into_document(json!({
            "buy": prices.buy,
            "sell": prices.sell,
            "buy_avg": prices.buy_avg,
            "sell_avg": prices.sell_avg,
            "buy_status": prices.buy_status,
            "sell_status": prices.sell_status,
            "buy_orders": prices.buy_orders,
            "sell_orders": prices.sell_orders,
            "priced_rank": item.rank,
            "volume_48h": statistics.volume_48h(item.rank),
            "avg_price_48h": statistics.avg_price_48h(item.rank).map(round2),
            "priced_at": Utc::now().to_rfc3339(),
        }))
    }
}

#[async_trait]
impl SyncJob for PriceJob {
    type Entity = PricedItem;

    fn name(&self) -> &str {
        "prices"
    }

    fn collection(&self) -> &str {
        collection::ITEMS
    }

    fn key(&self, entity: &PricedItem) -> Filter {
        Filter::eq("url_name", entity.url_name.as_str())
    }

    async fn entities(&self) -> Result<Vec<PricedItem>> {
        let docs = self
            .store
            .find_many(collection::ITEMS, &Filter::all(), Some(&Sort::asc("url_name")))
            .await?;
        Ok(docs.iter().filter_map(PricedItem::from_document).collect())
    }

    fn label(&self, entity: &PricedItem) -> String {
        entity.url_name.clone()
    }

    fn needs_refresh(&self, _entity: &PricedItem, _existing: &Document) -> bool {
        true
    }

    async fn fetch(
        &self,
        entity: &PricedItem,
        _existing: Option<&Document>,
    ) -> std::result::Result<Document, FetchError> {
        let orders = self.api.orders(&entity.url_name).await?;
        let statistics = self.api.statistics(&entity.url_name).await?;
        Ok(self.price_document(entity, &orders, &statistics))
    }
}
