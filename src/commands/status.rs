use serde_json::Value;

use crate::commands::{open_store, runtime};
use crate::constants::collection;
use crate::error::Result;
use crate::services::{Filter, Sort, Stage, Store};

pub fn run(top: usize) {
    println!("📊 Market Data Status\n");

    if let Err(e) = runtime().block_on(show_status(top)) {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn show_status(top: usize) -> Result<()> {
    let store = open_store().await?;

    for name in [collection::ITEMS, collection::RIVENS, collection::RELICS] {
        let count = store.count(name, &Filter::all()).await?;
        println!("🔹 {:<8} {:>8}", name, format_number(count));
    }

    let items = store.count(collection::ITEMS, &Filter::all()).await?;
    if items == 0 {
        println!("\n⚠️  No items stored. Run 'wfm-sync sync items' first.");
        return Ok(());
    }
    let enriched = store.count(collection::ITEMS, &Filter::eq("enriched", true)).await?;
    println!("   enriched {:>8}", format_number(enriched));

    println!("\n═══════════════════════════════════════════════════════════\n");
    show_groups(store.as_ref()).await?;

    println!("\n═══════════════════════════════════════════════════════════\n");
    show_top_rivens(store.as_ref(), top).await
}

async fn show_groups(store: &dyn Store) -> Result<()> {
    let groups = store
        .aggregate(
            collection::RIVENS,
            &[Stage::GroupCount("group".to_string()), Stage::Sort(Sort::desc("count"))],
        )
        .await?;

    if groups.is_empty() {
        return Ok(());
    }
    println!("🗂️  Riven weapons by group");
    for group in groups {
        let name = group.get("_id").and_then(Value::as_str).unwrap_or("unknown");
        let count = group.get("count").and_then(Value::as_u64).unwrap_or(0);
        println!("   {:<12} {:>6}", name, count);
    }
    Ok(())
}

async fn show_top_rivens(store: &dyn Store, top: usize) -> Result<()> {
    let best = store
        .aggregate(
            collection::RIVENS,
            &[
                Stage::Sort(Sort::desc("best_endo_per_plat")),
                Stage::Limit(top),
                Stage::Project(vec![
                    "item_name".to_string(),
                    "best_endo_per_plat".to_string(),
                    "min_price".to_string(),
                    "auction_count".to_string(),
                ]),
            ],
        )
        .await?;

    let best: Vec<_> = best
        .into_iter()
        .filter(|doc| doc.get("best_endo_per_plat").is_some_and(|v| !v.is_null()))
        .collect();
    if best.is_empty() {
        println!("⚠️  No riven auctions stored. Run 'wfm-sync sync rivens'.");
        return Ok(());
    }

    println!("💎 Top {} rivens by endo per platinum", best.len());
    for doc in best {
        println!(
            "   {:<24} {:>8.2} endo/p   from {:>6} p   {:>3} auctions",
            doc.get("item_name").and_then(Value::as_str).unwrap_or("?"),
            doc.get("best_endo_per_plat").and_then(Value::as_f64).unwrap_or(0.0),
            doc.get("min_price").and_then(Value::as_f64).unwrap_or(0.0),
            doc.get("auction_count").and_then(Value::as_u64).unwrap_or(0),
        );
    }
    Ok(())
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.insert(0, ',');
        }
        result.insert(0, c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1234567), "1,234,567");
    }
}
