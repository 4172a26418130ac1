use serde::{Deserialize, Serialize};

use crate::models::Auction;
use crate::utils::round2;

/// Endo returned by dissolving a riven mod
///
/// `100 * (mastery_level - 8) + 22.5 * mod_rank^2 + 200 * re_rolls`
pub fn calculate_endo(mastery_level: u8, mod_rank: u8, re_rolls: u32) -> f64 {
    let rank = f64::from(mod_rank);
    100.0 * (f64::from(mastery_level) - 8.0) + 22.5 * rank * rank + 200.0 * f64::from(re_rolls)
}

/// Endo per platinum, rounded to two decimals; 0 when the price is not positive
pub fn endo_per_plat(endo: f64, price: f64) -> f64 {
    if price <= 0.0 {
        0.0
    } else {
        round2(endo / price)
    }
}

/// One auction valued for dissolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionValue {
    pub auction_id: String,
    pub price: f64,
    pub endo: f64,
    pub endo_per_plat: f64,
    pub mastery_level: u8,
    pub mod_rank: u8,
    pub re_rolls: u32,
    pub seller: Option<String>,
    pub seller_status: String,
}

impl AuctionValue {
    pub fn from_auction(auction: &Auction) -> Self {
        let item = &auction.item;
        let price = auction.effective_price();
        let endo = calculate_endo(item.mastery_level, item.mod_rank, item.re_rolls);

        Self {
            auction_id: auction.id.clone(),
            price,
            endo,
            endo_per_plat: endo_per_plat(endo, price),
            mastery_level: item.mastery_level,
            mod_rank: item.mod_rank,
            re_rolls: item.re_rolls,
            seller: auction.owner.ingame_name.clone(),
            seller_status: auction.owner.status.clone(),
        }
    }
}

/// Value open auctions and keep the `keep` best by endo per plat
pub fn rank_auctions(auctions: &[Auction], keep: usize) -> Vec<AuctionValue> {
    let mut values: Vec<AuctionValue> = auctions
        .iter()
        .filter(|a| !a.closed)
        .map(AuctionValue::from_auction)
        .collect();

    values.sort_by(|a, b| b.endo_per_plat.total_cmp(&a.endo_per_plat));
    values.truncate(keep);
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::riven::{AuctionItem, AuctionOwner};

    fn auction(id: &str, price: f64, re_rolls: u32, closed: bool) -> Auction {
        Auction {
            id: id.to_string(),
            buyout_price: Some(price),
            starting_price: price,
            top_bid: None,
            is_direct_sell: true,
            closed,
            owner: AuctionOwner {
                ingame_name: Some("seller".to_string()),
                status: "ingame".to_string(),
            },
            item: AuctionItem {
                weapon_url_name: "rubico".to_string(),
                name: None,
                mastery_level: 16,
                mod_rank: 8,
                re_rolls,
                polarity: None,
                attributes: Vec::new(),
            },
        }
    }

    #[test]
    fn test_calculate_endo() {
        assert_eq!(calculate_endo(8, 0, 0), 0.0);
        assert_eq!(calculate_endo(16, 8, 50), 12240.0);
        assert_eq!(calculate_endo(10, 0, 1), 400.0);
    }

    #[test]
    fn test_endo_per_plat() {
        assert_eq!(endo_per_plat(12240.0, 100.0), 122.4);
        assert_eq!(endo_per_plat(1000.0, 3.0), 333.33);
        assert_eq!(endo_per_plat(1000.0, 0.0), 0.0);
        assert_eq!(endo_per_plat(1000.0, -5.0), 0.0);
    }

    #[test]
    fn test_rank_auctions_skips_closed_and_truncates() {
        let auctions = vec![
            auction("cheap", 50.0, 50, false),
            auction("closed", 1.0, 50, true),
            auction("pricey", 500.0, 50, false),
            auction("mid", 100.0, 50, false),
        ];

        let ranked = rank_auctions(&auctions, 2);
        let ids: Vec<&str> = ranked.iter().map(|v| v.auction_id.as_str()).collect();
        assert_eq!(ids, vec!["cheap", "mid"]);
        assert_eq!(ranked[0].endo, 12240.0);
        assert_eq!(ranked[0].endo_per_plat, 244.8);
    }
}
