use serde::{Deserialize, Serialize};

/// Weapon that can carry a riven mod (`GET /riven/items`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RivenWeapon {
    pub id: String,
    pub url_name: String,
    pub item_name: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub riven_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RivenItemsPayload {
    pub items: Vec<RivenWeapon>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RivenAttribute {
    pub url_name: String,
    pub value: f64,
    pub positive: bool,
}

/// The riven being auctioned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionItem {
    pub weapon_url_name: String,
    #[serde(default)]
    pub name: Option<String>,
    pub mastery_level: u8,
    pub mod_rank: u8,
    pub re_rolls: u32,
    #[serde(default)]
    pub polarity: Option<String>,
    #[serde(default)]
    pub attributes: Vec<RivenAttribute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionOwner {
    #[serde(default)]
    pub ingame_name: Option<String>,
    pub status: String,
}

/// One riven auction (`GET /auctions/search?type=riven&weapon_url_name=...`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: String,
    #[serde(default)]
    pub buyout_price: Option<f64>,
    pub starting_price: f64,
    #[serde(default)]
    pub top_bid: Option<f64>,
    #[serde(default)]
    pub is_direct_sell: bool,
    #[serde(default)]
    pub closed: bool,
    pub owner: AuctionOwner,
    pub item: AuctionItem,
}

impl Auction {
    /// Price a buyer would pay right now: buyout when set, else the starting price
    pub fn effective_price(&self) -> f64 {
        self.buyout_price.unwrap_or(self.starting_price)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuctionsPayload {
    pub auctions: Vec<Auction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auction_deserialize_and_price() {
        let raw = r#"{"auctions":[{"id":"a1","buyout_price":null,"starting_price":120,
            "owner":{"status":"ingame"},
            "item":{"weapon_url_name":"rubico","mastery_level":16,"mod_rank":8,"re_rolls":50,
                    "attributes":[{"url_name":"critical_damage","value":120.5,"positive":true}]}}]}"#;
        let parsed: AuctionsPayload = serde_json::from_str(raw).unwrap();
        let auction = &parsed.auctions[0];
        assert_eq!(auction.effective_price(), 120.0);
        assert_eq!(auction.item.re_rolls, 50);
        assert!(!auction.closed);
    }
}
