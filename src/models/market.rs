use serde::{Deserialize, Serialize};

/// Upstream response envelope: every market endpoint wraps its data in `payload`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub payload: T,
}

/// Entry of the tradable item catalog (`GET /items`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: String,
    pub url_name: String,
    pub item_name: String,
    #[serde(default)]
    pub thumb: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemsPayload {
    pub items: Vec<ItemSummary>,
}

/// Item detail (`GET /items/{url_name}`); one record per member of the set
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDetailPayload {
    pub item: ItemDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemDetail {
    pub id: String,
    #[serde(default)]
    pub items_in_set: Vec<SetMember>,
}

impl ItemDetail {
    /// The set member describing `url_name` itself
    pub fn member(&self, url_name: &str) -> Option<&SetMember> {
        self.items_in_set.iter().find(|m| m.url_name == url_name)
    }

    /// The set root (the "... Set" item), if this item belongs to a set
    pub fn set_root(&self) -> Option<&SetMember> {
        self.items_in_set.iter().find(|m| m.set_root)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetMember {
    pub id: String,
    pub url_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub set_root: bool,
    #[serde(default)]
    pub mod_max_rank: Option<u8>,
    #[serde(default)]
    pub ducats: Option<u32>,
    #[serde(default)]
    pub mastery_level: Option<u8>,
    #[serde(default)]
    pub trading_tax: Option<u32>,
    #[serde(default)]
    pub quantity_for_set: Option<u32>,
    #[serde(default)]
    pub en: Option<LocalizedInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalizedInfo {
    pub item_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub wiki_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Buy,
    Sell,
}

/// Order owner; `status` is the presence status ("ingame", "online", "offline")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUser {
    #[serde(default)]
    pub ingame_name: Option<String>,
    pub status: String,
}

/// One order from an item order book (`GET /items/{url_name}/orders`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub platinum: f64,
    pub order_type: OrderType,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub mod_rank: Option<u8>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    pub user: OrderUser,
}

fn default_quantity() -> u32 {
    1
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersPayload {
    pub orders: Vec<Order>,
}

/// Closed-trade statistics (`GET /items/{url_name}/statistics`)
#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsPayload {
    pub statistics_closed: ClosedStatistics,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClosedStatistics {
    #[serde(rename = "48hours", default)]
    pub last_48_hours: Vec<StatisticsEntry>,
    #[serde(rename = "90days", default)]
    pub last_90_days: Vec<StatisticsEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsEntry {
    pub datetime: String,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub avg_price: f64,
    #[serde(default)]
    pub median: Option<f64>,
    #[serde(default)]
    pub mod_rank: Option<u8>,
}

impl ClosedStatistics {
    /// Traded volume over the last 48 hours, optionally restricted to one mod rank
    pub fn volume_48h(&self, rank: Option<u8>) -> u64 {
        self.last_48_hours
            .iter()
            .filter(|e| rank.is_none() || e.mod_rank == rank)
            .map(|e| e.volume)
            .sum()
    }

    /// Volume-weighted average price over the last 48 hours
    pub fn avg_price_48h(&self, rank: Option<u8>) -> Option<f64> {
        let (weighted, volume) = self
            .last_48_hours
            .iter()
            .filter(|e| rank.is_none() || e.mod_rank == rank)
            .fold((0.0, 0u64), |(w, v), e| (w + e.avg_price * e.volume as f64, v + e.volume));

        if volume == 0 {
            None
        } else {
            Some(weighted / volume as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_payload_deserialize() {
        let raw = r#"{"payload":{"orders":[
            {"platinum":15,"order_type":"sell","quantity":2,"visible":true,"user":{"ingame_name":"Tenno","status":"ingame"}},
            {"platinum":9,"order_type":"buy","mod_rank":3,"user":{"status":"offline"}}
        ]}}"#;
        let parsed: Envelope<OrdersPayload> = serde_json::from_str(raw).unwrap();
        let orders = parsed.payload.orders;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].order_type, OrderType::Sell);
        assert_eq!(orders[1].mod_rank, Some(3));
        assert_eq!(orders[1].quantity, 1);
        assert!(orders[1].visible);
    }

    #[test]
    fn test_statistics_weighted_average() {
        let stats = ClosedStatistics {
            last_48_hours: vec![
                StatisticsEntry { datetime: "a".into(), volume: 1, avg_price: 10.0, median: None, mod_rank: None },
                StatisticsEntry { datetime: "b".into(), volume: 3, avg_price: 20.0, median: None, mod_rank: None },
            ],
            last_90_days: vec![],
        };
        assert_eq!(stats.volume_48h(None), 4);
        assert_eq!(stats.avg_price_48h(None), Some(17.5));
        assert_eq!(stats.avg_price_48h(Some(5)), None);
    }

    #[test]
    fn test_item_detail_member_lookup() {
        let raw = r#"{"item":{"id":"x","items_in_set":[
            {"id":"1","url_name":"ash_prime_set","set_root":true,"tags":["prime","set"]},
            {"id":"2","url_name":"ash_prime_chassis","ducats":45,"en":{"item_name":"Ash Prime Chassis"}}
        ]}}"#;
        let parsed: ItemDetailPayload = serde_json::from_str(raw).unwrap();
        let member = parsed.item.member("ash_prime_chassis").unwrap();
        assert_eq!(member.ducats, Some(45));
        assert_eq!(parsed.item.set_root().unwrap().url_name, "ash_prime_set");
    }
}
