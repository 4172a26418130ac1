use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::constants::collection;
use crate::error::Result;
use crate::models::Relic;
use crate::services::batch_orchestrator::SyncJob;
use crate::services::market_api::MarketApi;
use crate::services::resilient_client::FetchError;
use crate::services::store::{into_document, Document, Filter};

/// Relic drop tables. The feed is fetched once; a relic document is only
/// rewritten when its reward table changed.
pub struct RelicJob {
    api: Arc<MarketApi>,
}

impl RelicJob {
    pub fn new(api: Arc<MarketApi>) -> Self {
        Self { api }
    }
}

fn states_value(relic: &Relic) -> serde_json::Value {
    json!(relic
        .states
        .iter()
        .map(|(state, rewards)| json!({"state": state, "rewards": rewards}))
        .collect::<Vec<_>>())
}

#[async_trait]
impl SyncJob for RelicJob {
    type Entity = Relic;

    fn name(&self) -> &str {
        "relics"
    }

    fn collection(&self) -> &str {
        collection::RELICS
    }

    fn key(&self, entity: &Relic) -> Filter {
        Filter::eq("key", entity.key.as_str())
    }

    async fn entities(&self) -> Result<Vec<Relic>> {
        Ok(Relic::group(self.api.relics().await?))
    }

    fn label(&self, entity: &Relic) -> String {
        entity.key.clone()
    }

    fn needs_refresh(&self, entity: &Relic, existing: &Document) -> bool {
        existing.get("states") != Some(&states_value(entity))
    }

    async fn fetch(&self, entity: &Relic, _existing: Option<&Document>) -> std::result::Result<Document, FetchError> {
        Ok(into_document(json!({
            "tier": entity.tier,
            "name": entity.name,
            "states": states_value(entity),
            "updated_at": Utc::now().to_rfc3339(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientConfig, SyncConfig};
    use crate::services::batch_orchestrator::BatchOrchestrator;
    use crate::services::pacing::PacedScheduler;
    use crate::services::resilient_client::tests::{json as body, ScriptedTransport};
    use crate::services::resilient_client::{RequestOptions, ResilientClient, RetryPolicy};
    use crate::services::store::{MemoryStore, Store};

    const FEED: &str = r#"{"relics":[
        {"tier":"Axi","relicName":"A1","state":"Intact","rewards":[{"itemName":"Akstiletto Prime Barrel","rarity":"Uncommon","chance":11}]},
        {"tier":"Axi","relicName":"A1","state":"Radiant","rewards":[{"itemName":"Akstiletto Prime Barrel","rarity":"Uncommon","chance":20}]},
        {"tier":"Lith","relicName":"B2","state":"Intact","rewards":[]}
    ]}"#;

    fn job(feeds: usize) -> RelicJob {
        let transport = ScriptedTransport::new((0..feeds).map(|_| body(FEED)).collect());
        let client = Arc::new(ResilientClient::new(transport, RetryPolicy::default().with_max_retries(1)));
        let options = RequestOptions::new(1, PacedScheduler::disabled());
        let api = MarketApi::new(client, &ClientConfig::default(), &SyncConfig::default()).with_options(options, options);
        RelicJob::new(Arc::new(api))
    }

    #[tokio::test]
    async fn test_unchanged_relics_are_skipped_on_second_run() {
        let store = Arc::new(MemoryStore::new());
        let job = job(2);
        let orchestrator = BatchOrchestrator::new(store.clone());

        let first = orchestrator.run(&job, job.entities().await.unwrap(), 10, |_| {}).await.unwrap();
        assert_eq!(first.progress.new, 2);

        let second = orchestrator.run(&job, job.entities().await.unwrap(), 10, |_| {}).await.unwrap();
        assert_eq!(second.progress.skipped, 2);

        let axi = store
            .find_one(collection::RELICS, &Filter::eq("key", "axi_a1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(axi["states"].as_array().unwrap().len(), 2);
        assert_eq!(axi["tier"], "Axi");
    }
}
