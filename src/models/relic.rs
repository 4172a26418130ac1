use serde::{Deserialize, Serialize};

/// Drop-table feed: one entry per relic and refinement state
#[derive(Debug, Clone, Deserialize)]
pub struct RelicFeed {
    pub relics: Vec<RelicEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelicEntry {
    pub tier: String,
    pub relic_name: String,
    pub state: String,
    #[serde(default)]
    pub rewards: Vec<RelicReward>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelicReward {
    pub item_name: String,
    pub rarity: String,
    pub chance: f64,
}

impl RelicEntry {
    /// Stable key, e.g. "axi_a1"
    pub fn key(&self) -> String {
        format!("{}_{}", self.tier, self.relic_name).to_lowercase()
    }
}

/// All refinement states of one relic grouped together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relic {
    pub key: String,
    pub tier: String,
    pub name: String,
    /// state ("Intact", "Exceptional", ...) -> rewards
    pub states: Vec<(String, Vec<RelicReward>)>,
}

impl Relic {
    /// Group feed entries by relic, preserving feed order
    pub fn group(entries: Vec<RelicEntry>) -> Vec<Relic> {
        let mut relics: Vec<Relic> = Vec::new();

        for entry in entries {
            let key = entry.key();
            match relics.iter_mut().find(|r| r.key == key) {
                Some(relic) => relic.states.push((entry.state, entry.rewards)),
                None => relics.push(Relic {
                    key,
                    tier: entry.tier,
                    name: entry.relic_name,
                    states: vec![(entry.state, entry.rewards)],
                }),
            }
        }

        relics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_relic_states() {
        let raw = r#"{"relics":[
            {"tier":"Axi","relicName":"A1","state":"Intact","rewards":[{"itemName":"Akstiletto Prime Barrel","rarity":"Uncommon","chance":11}]},
            {"tier":"Axi","relicName":"A1","state":"Radiant","rewards":[]},
            {"tier":"Lith","relicName":"B2","state":"Intact","rewards":[]}
        ]}"#;
        let feed: RelicFeed = serde_json::from_str(raw).unwrap();
        let relics = Relic::group(feed.relics);
        assert_eq!(relics.len(), 2);
        assert_eq!(relics[0].key, "axi_a1");
        assert_eq!(relics[0].states.len(), 2);
        assert_eq!(relics[1].name, "B2");
    }
}
