use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

use crate::constants::LOOKUP_MAX_RETRIES;
use crate::models::market::{
    ClosedStatistics, Envelope, ItemDetail, ItemDetailPayload, ItemSummary, ItemsPayload, Order,
    OrdersPayload, StatisticsPayload,
};
use crate::models::relic::{RelicEntry, RelicFeed};
use crate::models::riven::{Auction, AuctionsPayload, RivenItemsPayload, RivenWeapon};
use crate::models::{ClientConfig, SyncConfig};
use crate::services::pacing::PacedScheduler;
use crate::services::resilient_client::{FetchError, RequestOptions, ResilientClient};

/// Typed client for the marketplace read API and the relic drop-table feed.
///
/// Catalog listings and feeds are one-off lookups (short pacing, large retry
/// budget); per-entity endpoints use the bulk options of the running job.
pub struct MarketApi {
    client: Arc<ResilientClient>,
    base_url: String,
    relic_feed_url: String,
    bulk: RequestOptions,
    lookup: RequestOptions,
}

impl MarketApi {
    pub fn new(client: Arc<ResilientClient>, config: &ClientConfig, sync: &SyncConfig) -> Self {
        Self {
            client,
            base_url: config.market_api_base.trim_end_matches('/').to_string(),
            relic_feed_url: config.relic_feed_url.clone(),
            bulk: RequestOptions::new(
                sync.max_retries,
                PacedScheduler::new(sync.min_delay_ms, sync.max_delay_ms),
            ),
            lookup: RequestOptions::new(
                LOOKUP_MAX_RETRIES,
                PacedScheduler::new(config.lookup_min_delay_ms, config.lookup_max_delay_ms),
            ),
        }
    }

    /// Override both option sets (tests, dry runs)
    pub fn with_options(mut self, bulk: RequestOptions, lookup: RequestOptions) -> Self {
        self.bulk = bulk;
        self.lookup = lookup;
        self
    }

    pub fn client(&self) -> &Arc<ResilientClient> {
        &self.client
    }

    /// Full tradable item catalog
    pub async fn items(&self) -> Result<Vec<ItemSummary>, FetchError> {
        let url = format!("{}/items", self.base_url);
        let payload: ItemsPayload = self.payload(&url, self.lookup).await?;
        debug!(items = payload.items.len(), "Fetched item catalog");
        Ok(payload.items)
    }

    /// Item detail including every member of its set
    pub async fn item(&self, url_name: &str) -> Result<ItemDetail, FetchError> {
        let url = format!("{}/items/{}", self.base_url, url_name);
        let payload: ItemDetailPayload = self.payload(&url, self.bulk).await?;
        Ok(payload.item)
    }

    pub async fn orders(&self, url_name: &str) -> Result<Vec<Order>, FetchError> {
        let url = format!("{}/items/{}/orders", self.base_url, url_name);
        let payload: OrdersPayload = self.payload(&url, self.bulk).await?;
        Ok(payload.orders)
    }

    pub async fn statistics(&self, url_name: &str) -> Result<ClosedStatistics, FetchError> {
        let url = format!("{}/items/{}/statistics", self.base_url, url_name);
        let payload: StatisticsPayload = self.payload(&url, self.bulk).await?;
        Ok(payload.statistics_closed)
    }

    /// Weapons that can carry a riven mod
    pub async fn riven_items(&self) -> Result<Vec<RivenWeapon>, FetchError> {
        let url = format!("{}/riven/items", self.base_url);
        let payload: RivenItemsPayload = self.payload(&url, self.lookup).await?;
        debug!(weapons = payload.items.len(), "Fetched riven weapon catalog");
        Ok(payload.items)
    }

    /// Open riven auctions for one weapon, cheapest first
    pub async fn riven_auctions(&self, weapon_url_name: &str) -> Result<Vec<Auction>, FetchError> {
        let url = format!(
            "{}/auctions/search?type=riven&weapon_url_name={}&sort_by=price_asc",
            self.base_url, weapon_url_name
        );
        let payload: AuctionsPayload = self.payload(&url, self.bulk).await?;
        Ok(payload.auctions)
    }

    /// Relic drop-table feed (not wrapped in a payload envelope)
    pub async fn relics(&self) -> Result<Vec<RelicEntry>, FetchError> {
        let feed: RelicFeed = self
            .client
            .get_json_with(&self.relic_feed_url, self.lookup)
            .await?;
        debug!(entries = feed.relics.len(), "Fetched relic feed");
        Ok(feed.relics)
    }

    async fn payload<T: DeserializeOwned>(&self, url: &str, options: RequestOptions) -> Result<T, FetchError> {
        let envelope: Envelope<T> = self.client.get_json_with(url, options).await?;
        Ok(envelope.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::resilient_client::tests::{json, status, ScriptedTransport};
    use crate::services::resilient_client::RetryPolicy;

    fn api(transport: Arc<ScriptedTransport>) -> MarketApi {
        let client = Arc::new(ResilientClient::new(transport, RetryPolicy::default().with_max_retries(2)));
        let config = ClientConfig {
            market_api_base: "https://api.test/v1/".to_string(),
            relic_feed_url: "https://feed.test/relics.json".to_string(),
            ..ClientConfig::default()
        };
        let options = RequestOptions::new(2, PacedScheduler::disabled());
        MarketApi::new(client, &config, &SyncConfig::default()).with_options(options, options)
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_unwraps_envelope() {
        let transport = ScriptedTransport::new(vec![json(
            r#"{"payload":{"items":[{"id":"1","url_name":"ash_prime_set","item_name":"Ash Prime Set"}]}}"#,
        )]);
        let items = api(transport.clone()).items().await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url_name, "ash_prime_set");
        assert_eq!(transport.requests.lock().unwrap()[0].url, "https://api.test/v1/items");
    }

    #[tokio::test(start_paused = true)]
    async fn test_entity_urls() {
        let transport = ScriptedTransport::new(vec![
            json(r#"{"payload":{"orders":[]}}"#),
            json(r#"{"payload":{"statistics_closed":{"48hours":[],"90days":[]}}}"#),
            json(r#"{"payload":{"auctions":[]}}"#),
        ]);
        let api = api(transport.clone());

        assert!(api.orders("ash_prime_set").await.unwrap().is_empty());
        assert_eq!(api.statistics("ash_prime_set").await.unwrap().volume_48h(None), 0);
        assert!(api.riven_auctions("rubico").await.unwrap().is_empty());

        let urls: Vec<String> = transport.requests.lock().unwrap().iter().map(|r| r.url.clone()).collect();
        assert_eq!(urls[0], "https://api.test/v1/items/ash_prime_set/orders");
        assert_eq!(urls[1], "https://api.test/v1/items/ash_prime_set/statistics");
        assert!(urls[2].contains("weapon_url_name=rubico"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_not_found_propagates() {
        let transport = ScriptedTransport::new(vec![status(404)]);
        let err = api(transport).item("removed_item").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relic_feed_is_not_enveloped() {
        let transport = ScriptedTransport::new(vec![json(
            r#"{"relics":[{"tier":"Axi","relicName":"A1","state":"Intact","rewards":[]}]}"#,
        )]);
        let relics = api(transport.clone()).relics().await.unwrap();
        assert_eq!(relics[0].key(), "axi_a1");
        assert_eq!(transport.requests.lock().unwrap()[0].url, "https://feed.test/relics.json");
    }
}
