use serde_json::Value;

use crate::config::Config;
use crate::records::{Category, HotelQuote};

/// Alias tables for the provider's unfixed schema. Keys are matched after
/// stripping punctuation and case, so "hotel_name" and "hotelName" coincide.
const NAME_ALIASES: &[&str] = &["name", "hotelName", "propertyName", "hotel", "title"];
const ID_ALIASES: &[&str] = &["id", "hotelId", "stableId", "propertyId", "key"];
const RATING_ALIASES: &[&str] = &["rating", "stars", "reviewScore", "score"];
const REVIEW_COUNT_ALIASES: &[&str] = &["reviewCount", "reviews", "numReviews", "totalReviews"];
const FLAT_PRICE_ALIASES: &[&str] = &["price", "minPrice", "lowestPrice", "rate", "amount"];
const NESTED_RATES_ALIASES: &[&str] = &["rates", "vendorRates", "offers", "prices"];
const RATE_PRICE_ALIASES: &[&str] = &["price", "rate", "amount", "value"];
const RATE_VENDOR_ALIASES: &[&str] = &["vendor", "source", "site", "provider", "ota"];

/// The provider exposes at most four parallel vendor/price column pairs.
const VENDOR_PAIR_SLOTS: usize = 4;

/// One vendor's asking price, in the order the provider listed it.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorPrice {
    pub vendor: Option<String>,
    pub price: f64,
}

/// Normalize a full page of raw provider records, silently dropping any
/// record that fails extraction. Partial record loss is expected from this
/// provider and is not a date-level error.
pub fn normalize_page(records: &[Value], config: &Config) -> Vec<HotelQuote> {
    records
        .iter()
        .filter_map(|record| normalize_record(record, config))
        .collect()
}

/// Turn one raw record into a canonical quote, or `None` when no name or no
/// positive price can be resolved.
pub fn normalize_record(record: &Value, config: &Config) -> Option<HotelQuote> {
    let object = record.as_object()?;

    let name = find_value(object, NAME_ALIASES)
        .and_then(value_to_string)
        .filter(|name| !name.is_empty())?;

    let best = extract_best_price(object)?;

    let stable_id = find_value(object, ID_ALIASES).and_then(value_to_string);
    let rating = find_value(object, RATING_ALIASES).and_then(value_to_f64);
    let review_count = find_value(object, REVIEW_COUNT_ALIASES)
        .and_then(value_to_f64)
        .map(|count| count as u32);

    let category = categorize(&name, config);

    Some(HotelQuote {
        name,
        stable_id,
        price: best.price,
        vendor: best.vendor,
        rating,
        review_count,
        category,
    })
}

/// Ordered extraction strategies, first success wins:
/// 1. parallel vendor/price column pairs (`price1`..`price4`),
/// 2. a nested per-vendor rates array,
/// 3. a single flat price field.
fn extract_best_price(object: &serde_json::Map<String, Value>) -> Option<VendorPrice> {
    extract_vendor_pairs(object)
        .or_else(|| extract_nested_rates(object))
        .or_else(|| extract_flat_price(object))
}

fn extract_vendor_pairs(object: &serde_json::Map<String, Value>) -> Option<VendorPrice> {
    let mut candidates = Vec::new();
    for slot in 1..=VENDOR_PAIR_SLOTS {
        let price_key = format!("price{}", slot);
        let vendor_key = format!("vendor{}", slot);

        let Some(price) = find_value(object, &[&price_key]).and_then(value_to_f64) else {
            continue;
        };
        if price <= 0.0 {
            continue;
        }
        let vendor = find_value(object, &[&vendor_key]).and_then(value_to_string);
        candidates.push(VendorPrice { vendor, price });
    }
    pick_lowest(candidates)
}

fn extract_nested_rates(object: &serde_json::Map<String, Value>) -> Option<VendorPrice> {
    let rates = find_value(object, NESTED_RATES_ALIASES)?.as_array()?;

    let mut candidates = Vec::new();
    for rate in rates {
        let Some(rate_object) = rate.as_object() else {
            continue;
        };
        let Some(price) = find_value(rate_object, RATE_PRICE_ALIASES).and_then(value_to_f64)
        else {
            continue;
        };
        if price <= 0.0 {
            continue;
        }
        let vendor = find_value(rate_object, RATE_VENDOR_ALIASES).and_then(value_to_string);
        candidates.push(VendorPrice { vendor, price });
    }
    pick_lowest(candidates)
}

fn extract_flat_price(object: &serde_json::Map<String, Value>) -> Option<VendorPrice> {
    let price = find_value(object, FLAT_PRICE_ALIASES).and_then(value_to_f64)?;
    if price <= 0.0 {
        return None;
    }
    let vendor = find_value(object, RATE_VENDOR_ALIASES).and_then(value_to_string);
    Some(VendorPrice { vendor, price })
}

/// Strictly lowest price wins; on an exact tie the earlier-listed vendor
/// keeps the slot.
fn pick_lowest(candidates: Vec<VendorPrice>) -> Option<VendorPrice> {
    let mut best: Option<VendorPrice> = None;
    for candidate in candidates {
        match &best {
            Some(current) if candidate.price >= current.price => {}
            _ => best = Some(candidate),
        }
    }
    best
}

fn categorize(name: &str, config: &Config) -> Category {
    if config.own_property.matches(name) {
        return Category::Own;
    }
    let lowered = name.to_lowercase();
    if config
        .direct_competitors
        .iter()
        .any(|competitor| competitor.to_lowercase() == lowered)
    {
        return Category::DirectCompetitor;
    }
    if config
        .competitor_fragments
        .iter()
        .any(|fragment| lowered.contains(&fragment.to_lowercase()))
    {
        return Category::TrackedCompetitor;
    }
    Category::Market
}

pub fn find_value<'a, S: AsRef<str>>(
    object: &'a serde_json::Map<String, Value>,
    aliases: &[S],
) -> Option<&'a Value> {
    for alias in aliases {
        let alias_norm = normalize_key(alias.as_ref());
        if let Some((_, value)) = object
            .iter()
            .find(|(key, _)| normalize_key(key) == alias_norm)
        {
            return Some(value);
        }
    }
    None
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(num) => num.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }
}
