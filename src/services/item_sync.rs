use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::constants::collection;
use crate::error::Result;
use crate::models::market::ItemDetail;
use crate::models::ItemSummary;
use crate::services::batch_orchestrator::SyncJob;
use crate::services::market_api::MarketApi;
use crate::services::resilient_client::FetchError;
use crate::services::store::{into_document, Document, Filter};

/// Item catalog sync: listing entries are enriched with their item detail
/// (set membership, tags, mastery, ducats, max rank) once, then skipped until
/// forced. Price fields written by the price job are left untouched.
pub struct ItemCatalogJob {
    api: Arc<MarketApi>,
}

impl ItemCatalogJob {
    pub fn new(api: Arc<MarketApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SyncJob for ItemCatalogJob {
    type Entity = ItemSummary;

    fn name(&self) -> &str {
        "items"
    }

    fn collection(&self) -> &str {
        collection::ITEMS
    }

    fn key(&self, entity: &ItemSummary) -> Filter {
        Filter::eq("url_name", entity.url_name.as_str())
    }

    async fn entities(&self) -> Result<Vec<ItemSummary>> {
        Ok(self.api.items().await?)
    }

    fn label(&self, entity: &ItemSummary) -> String {
        entity.url_name.clone()
    }

    fn needs_refresh(&self, _entity: &ItemSummary, existing: &Document) -> bool {
        existing.get("enriched").and_then(Value::as_bool) != Some(true)
    }

    async fn fetch(
        &self,
        entity: &ItemSummary,
        _existing: Option<&Document>,
    ) -> std::result::Result<Document, FetchError> {
        let detail = self.api.item(&entity.url_name).await?;
        Ok(item_document(entity, &detail))
    }
}

/// Catalog fields for one item
pub fn item_document(entity: &ItemSummary, detail: &ItemDetail) -> Document {
    let mut doc = into_document(json!({
        "id": entity.id,
        "item_name": entity.item_name,
        "thumb": entity.thumb,
        "enriched": true,
        "enriched_at": Utc::now().to_rfc3339(),
    }));

    if let Some(member) = detail.member(&entity.url_name) {
        doc.extend(into_document(json!({
            "tags": member.tags,
            "mod_max_rank": member.mod_max_rank,
            "ducats": member.ducats,
            "mastery_level": member.mastery_level,
            "trading_tax": member.trading_tax,
            "quantity_for_set": member.quantity_for_set,
            "wiki_link": member.en.as_ref().and_then(|en| en.wiki_link.clone()),
            "is_set": member.set_root,
        })));
    }

    match detail.set_root() {
        Some(root) if root.url_name == entity.url_name => {
            let parts: Vec<&str> = detail
                .items_in_set
                .iter()
                .filter(|m| !m.set_root)
                .map(|m| m.url_name.as_str())
                .collect();
            doc.insert("set_parts".to_string(), json!(parts));
        }
        Some(root) => {
            doc.insert("set_name".to_string(), json!(root.url_name));
        }
        None => {}
    }

    doc
}
