use crate::models::{Money, SearchResult, SoldItem, parse_amount};

pub const DEFAULT_PRICE: &str = "0.00";

/// Suggested list price as a two-decimal string. Preference order: mean of
/// numeric sold prices, first sold item's listed price, first search result's
/// price, then `0.00`.
pub fn suggest_price(sold: &[SoldItem], results: &[SearchResult]) -> String {
    let sold_prices: Vec<f64> = sold
        .iter()
        .filter_map(|item| item.sold_price.as_ref()?.amount())
        .collect();
    if let Some(mean) = mean(&sold_prices) {
        return format_price(mean);
    }

    let listed = |price: Option<&Money>| price.and_then(|p| parse_amount(&p.value));
    listed(sold.first().and_then(|item| item.price.as_ref()))
        .or_else(|| listed(results.first().and_then(|r| r.price.as_ref())))
        .map(format_price)
        .unwrap_or_else(|| DEFAULT_PRICE.to_string())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn format_price(value: f64) -> String {
    format!("{:.2}", (value * 100.0).round() / 100.0)
}
