//! Order-book pricing
//!
//! Pure functions over one item's order book. No I/O.

use serde::{Deserialize, Serialize};

use crate::models::{Order, OrderType};
use crate::utils::round2;

/// Filters applied before pricing
#[derive(Debug, Clone)]
pub struct PriceOptions<'a> {
    /// Acceptable owner statuses, most preferred first; the first status with
    /// at least one matching order wins
    pub status_fallback: &'a [String],
    /// Only orders at this mod rank (rank-bearing items)
    pub rank: Option<u8>,
    /// Orders averaged into `buy_avg` / `sell_avg`
    pub avg_depth: usize,
}

/// Prices derived from an order book; `None` when no order qualifies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub buy: Option<f64>,
    pub sell: Option<f64>,
    pub buy_avg: Option<f64>,
    pub sell_avg: Option<f64>,
    /// Status bucket the buy / sell side was priced from
    pub buy_status: Option<String>,
    pub sell_status: Option<String>,
    pub buy_orders: usize,
    pub sell_orders: usize,
}

/// Calculate buy/sell prices
///
/// * Buy = highest buy order, BuyAvg = mean of the `avg_depth` highest
/// * Sell = lowest sell order, SellAvg = mean of the `avg_depth` lowest
pub fn calculate_prices(orders: &[Order], options: &PriceOptions) -> PriceSummary {
    let mut summary = PriceSummary::default();

    if let Some((status, mut prices)) = select_bucket(orders, OrderType::Buy, options) {
        prices.sort_by(|a, b| b.total_cmp(a));
        summary.buy = prices.first().copied();
        summary.buy_avg = top_mean(&prices, options.avg_depth);
        summary.buy_orders = prices.len();
        summary.buy_status = Some(status);
    }

    if let Some((status, mut prices)) = select_bucket(orders, OrderType::Sell, options) {
        prices.sort_by(|a, b| a.total_cmp(b));
        summary.sell = prices.first().copied();
        summary.sell_avg = top_mean(&prices, options.avg_depth);
        summary.sell_orders = prices.len();
        summary.sell_status = Some(status);
    }

    summary
}

/// Prices of the first non-empty status bucket for one side of the book
fn select_bucket(orders: &[Order], side: OrderType, options: &PriceOptions) -> Option<(String, Vec<f64>)> {
    options.status_fallback.iter().find_map(|status| {
        let prices: Vec<f64> = orders
            .iter()
            .filter(|o| o.visible && o.order_type == side)
            .filter(|o| o.user.status.eq_ignore_ascii_case(status))
            .filter(|o| options.rank.is_none() || o.mod_rank == options.rank)
            .map(|o| o.platinum)
            .collect();

        (!prices.is_empty()).then(|| (status.clone(), prices))
    })
}

fn top_mean(sorted: &[f64], depth: usize) -> Option<f64> {
    let take = depth.max(1).min(sorted.len());
    if take == 0 {
        return None;
    }
    let sum: f64 = sorted[..take].iter().sum();
    Some(round2(sum / take as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::OrderUser;

    fn order(side: OrderType, platinum: f64, status: &str, rank: Option<u8>) -> Order {
        Order {
            platinum,
            order_type: side,
            quantity: 1,
            mod_rank: rank,
            visible: true,
            user: OrderUser {
                ingame_name: None,
                status: status.to_string(),
            },
        }
    }

    fn fallback() -> Vec<String> {
        vec!["ingame".to_string(), "online".to_string()]
    }

    #[test]
    fn test_buy_price_and_average() {
        let orders: Vec<Order> = [100.0, 90.0, 80.0, 70.0, 60.0, 50.0]
            .iter()
            .map(|p| order(OrderType::Buy, *p, "ingame", None))
            .collect();
        let statuses = fallback();
        let options = PriceOptions {
            status_fallback: &statuses,
            rank: None,
            avg_depth: 5,
        };

        let prices = calculate_prices(&orders, &options);
        assert_eq!(prices.buy, Some(100.0));
        assert_eq!(prices.buy_avg, Some(80.0));
        assert_eq!(prices.buy_orders, 6);
        assert_eq!(prices.sell, None);
    }

    #[test]
    fn test_sell_side_uses_lowest() {
        let orders = vec![
            order(OrderType::Sell, 25.0, "ingame", None),
            order(OrderType::Sell, 15.0, "ingame", None),
            order(OrderType::Sell, 20.0, "ingame", None),
        ];
        let statuses = fallback();
        let options = PriceOptions {
            status_fallback: &statuses,
            rank: None,
            avg_depth: 2,
        };

        let prices = calculate_prices(&orders, &options);
        assert_eq!(prices.sell, Some(15.0));
        assert_eq!(prices.sell_avg, Some(17.5));
    }

    #[test]
    fn test_status_fallback_first_non_empty_bucket() {
        let orders = vec![
            order(OrderType::Sell, 10.0, "offline", None),
            order(OrderType::Sell, 30.0, "online", None),
            order(OrderType::Sell, 40.0, "online", None),
            order(OrderType::Buy, 5.0, "ingame", None),
        ];
        let statuses = fallback();
        let options = PriceOptions {
            status_fallback: &statuses,
            rank: None,
            avg_depth: 5,
        };

        let prices = calculate_prices(&orders, &options);
        assert_eq!(prices.sell, Some(30.0));
        assert_eq!(prices.sell_status.as_deref(), Some("online"));
        assert_eq!(prices.buy_status.as_deref(), Some("ingame"));
    }

    #[test]
    fn test_rank_filter_and_hidden_orders() {
        let mut hidden = order(OrderType::Sell, 1.0, "ingame", Some(10));
        hidden.visible = false;
        let orders = vec![
            hidden,
            order(OrderType::Sell, 50.0, "ingame", Some(0)),
            order(OrderType::Sell, 200.0, "ingame", Some(10)),
        ];
        let statuses = fallback();
        let options = PriceOptions {
            status_fallback: &statuses,
            rank: Some(10),
            avg_depth: 5,
        };

        assert_eq!(calculate_prices(&orders, &options).sell, Some(200.0));
    }

    #[test]
    fn test_empty_book() {
        let statuses = fallback();
        let options = PriceOptions {
            status_fallback: &statuses,
            rank: None,
            avg_depth: 5,
        };
        assert_eq!(calculate_prices(&[], &options), PriceSummary::default());
    }
}
