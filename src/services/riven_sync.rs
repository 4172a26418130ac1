use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::constants::{collection, RIVEN_AUCTIONS_KEPT};
use crate::error::Result;
use crate::models::{Auction, RivenWeapon};
use crate::services::batch_orchestrator::SyncJob;
use crate::services::endo_calculator::rank_auctions;
use crate::services::market_api::MarketApi;
use crate::services::resilient_client::FetchError;
use crate::services::store::{into_document, Document, Filter};

/// Riven auctions per weapon, valued by endo per platinum
pub struct RivenJob {
    api: Arc<MarketApi>,
}

impl RivenJob {
    pub fn new(api: Arc<MarketApi>) -> Self {
        Self { api }
    }
}

/// Weapon summary with its best auctions
pub fn riven_document(weapon: &RivenWeapon, auctions: &[Auction]) -> Document {
    let open = auctions.iter().filter(|a| !a.closed).count();
    let best = rank_auctions(auctions, RIVEN_AUCTIONS_KEPT);
    let cheapest = auctions
        .iter()
        .filter(|a| !a.closed)
        .map(Auction::effective_price)
        .min_by(|a, b| a.total_cmp(b));

    into_document(json!({
        "item_name": weapon.item_name,
        "group": weapon.group,
        "riven_type": weapon.riven_type,
        "auction_count": open,
        "min_price": cheapest,
        "best_endo_per_plat": best.first().map(|a| a.endo_per_plat),
        "best_auctions": best,
        "updated_at": Utc::now().to_rfc3339(),
    }))
}

#[async_trait]
impl SyncJob for RivenJob {
    type Entity = RivenWeapon;

    fn name(&self) -> &str {
        "rivens"
    }

    fn collection(&self) -> &str {
        collection::RIVENS
    }

    fn key(&self, entity: &RivenWeapon) -> Filter {
        Filter::eq("url_name", entity.url_name.as_str())
    }

    async fn entities(&self) -> Result<Vec<RivenWeapon>> {
        Ok(self.api.riven_items().await?)
    }

    fn label(&self, entity: &RivenWeapon) -> String {
        entity.url_name.clone()
    }

    fn needs_refresh(&self, _entity: &RivenWeapon, _existing: &Document) -> bool {
        true
    }

    async fn fetch(
        &self,
        entity: &RivenWeapon,
        _existing: Option<&Document>,
    ) -> std::result::Result<Document, FetchError> {
        let auctions = self.api.riven_auctions(&entity.url_name).await?;
        Ok(riven_document(entity, &auctions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::riven::AuctionsPayload;

    fn weapon() -> RivenWeapon {
        RivenWeapon {
            id: "w1".to_string(),
            url_name: "rubico".to_string(),
            item_name: "Rubico".to_string(),
            group: Some("primary".to_string()),
            riven_type: Some("rifle".to_string()),
        }
    }

    fn auctions() -> Vec<Auction> {
        let raw = json!({"auctions": [
            {"id": "a", "buyout_price": 100, "starting_price": 100, "owner": {"status": "ingame"},
             "item": {"weapon_url_name": "rubico", "mastery_level": 16, "mod_rank": 8, "re_rolls": 50}},
            {"id": "b", "buyout_price": null, "starting_price": 40, "owner": {"status": "online"},
             "item": {"weapon_url_name": "rubico", "mastery_level": 8, "mod_rank": 0, "re_rolls": 2}},
            {"id": "c", "buyout_price": 5, "starting_price": 5, "closed": true, "owner": {"status": "offline"},
             "item": {"weapon_url_name": "rubico", "mastery_level": 16, "mod_rank": 8, "re_rolls": 90}}
        ]});
        serde_json::from_value::<AuctionsPayload>(raw).unwrap().auctions
    }

    #[test]
    fn test_riven_document_ranks_open_auctions() {
        let doc = riven_document(&weapon(), &auctions());

        assert_eq!(doc["auction_count"], 2);
        assert_eq!(doc["min_price"], 40.0);
        assert_eq!(doc["best_endo_per_plat"], 122.4);
        assert_eq!(doc["best_auctions"][0]["auction_id"], "a");
        assert_eq!(doc["best_auctions"].as_array().unwrap().len(), 2);
        assert_eq!(doc["group"], "primary");
    }

    #[test]
    fn test_weapon_without_auctions() {
        let doc = riven_document(&weapon(), &[]);
        assert_eq!(doc["auction_count"], 0);
        assert!(doc["min_price"].is_null());
        assert!(doc["best_endo_per_plat"].is_null());
    }
}
