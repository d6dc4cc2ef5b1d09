use crate::error::MarketError;
use chrono::prelude::*;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use std::time::Duration;

pub const API_BASE: &str = "https://api.coingecko.com/api/v3";
pub const VS_CURRENCY: &str = "usd";
pub const PAGE_SIZE: u32 = 50;
pub const TREND_DAYS: u32 = 7;

static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("cryptodash_rs/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(10))
        .build()
        .expect("default reqwest client")
});

/// One record of the market snapshot. The snapshot is replaced wholesale on
/// every fetch; there are no partial updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub current_price: f64,
    // null upstream for freshly listed coins
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    pub market_cap: f64,
}

impl Asset {
    /// 24h change for ordering purposes; missing values sort last.
    fn change_for_sort(&self) -> f64 {
        self.price_change_percentage_24h.unwrap_or(f64::NEG_INFINITY)
    }
}

/// One point of the 7-day trend series for a single asset.
///
/// Ephemeral: replaced whenever a new asset is charted, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    pub timestamp_ms: i64,
    pub price: f64,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(f64, f64)>,
}

// Fetch the top page of the market listing, ordered by market cap descending.
// Fixed currency and page size; no retry on failure.
pub async fn fetch_markets() -> Result<Vec<Asset>, MarketError> {
    let url = format!(
        "{API_BASE}/coins/markets?vs_currency={VS_CURRENCY}&order=market_cap_desc&per_page={PAGE_SIZE}&page=1&sparkline=false"
    );
    let assets = CLIENT
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json::<Vec<Asset>>()
        .await?;
    Ok(assets)
}

// Fetch the 7-day price history for one asset.
pub async fn fetch_market_chart(id: &str) -> Result<Vec<TrendPoint>, MarketError> {
    let url = format!("{API_BASE}/coins/{id}/market_chart?vs_currency={VS_CURRENCY}&days={TREND_DAYS}");
    let chart = CLIENT
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json::<MarketChart>()
        .await?;
    Ok(chart
        .prices
        .into_iter()
        .map(|(timestamp, price)| TrendPoint {
            timestamp_ms: timestamp as i64,
            price,
        })
        .collect())
}

#[cfg(test)]
pub(crate) fn fetch_err_for_tests() -> MarketError {
    let err = reqwest::Client::new()
        .get("http://[invalid")
        .build()
        .expect_err("invalid url must fail to build");
    MarketError::Http(err)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    MarketCap,
    Name,
    Price,
    Change,
}

impl SortKey {
    pub fn all() -> &'static [SortKey] {
        &[
            SortKey::MarketCap,
            SortKey::Name,
            SortKey::Price,
            SortKey::Change,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::MarketCap => "market_cap",
            SortKey::Name => "name",
            SortKey::Price => "price",
            SortKey::Change => "change",
        }
    }

    /// Human label for the sort selector.
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::MarketCap => "market cap",
            SortKey::Name => "name",
            SortKey::Price => "price",
            SortKey::Change => "24h change",
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "market_cap" => Ok(SortKey::MarketCap),
            "name" => Ok(SortKey::Name),
            "price" => Ok(SortKey::Price),
            "change" => Ok(SortKey::Change),
            _ => Err(format!("Unknown sort key: '{s}'")),
        }
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returns a stable-sorted copy of the snapshot. `None` keeps fetch order.
pub fn sorted(snapshot: &[Asset], key: Option<SortKey>) -> Vec<Asset> {
    let mut view = snapshot.to_vec();
    let Some(key) = key else {
        return view;
    };
    match key {
        SortKey::MarketCap => view.sort_by(|a, b| descending(a.market_cap, b.market_cap)),
        SortKey::Name => view.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
        SortKey::Price => view.sort_by(|a, b| descending(a.current_price, b.current_price)),
        SortKey::Change => view.sort_by(|a, b| descending(a.change_for_sort(), b.change_for_sort())),
    }
    view
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// One listing line: `Name (SYMBOL) - $price`.
pub fn list_entry(asset: &Asset) -> String {
    format!(
        "{} ({}) - {}",
        asset.name,
        asset.symbol.to_uppercase(),
        format_usd(asset.current_price)
    )
}

pub fn format_usd(value: f64) -> String {
    format!("${}", format_amount(value))
}

// Tiered precision: large values get thousands separators, sub-dollar
// values get more decimals so they stay legible.
pub fn format_amount(value: f64) -> String {
    if value >= 1000.0 {
        format_with_commas(value)
    } else if value >= 1.0 {
        format!("{value:.2}")
    } else if value >= 0.01 {
        format!("{value:.4}")
    } else {
        format!("{value:.8}")
    }
}

pub fn format_market_cap(value: f64) -> String {
    format!("${}", group_thousands(&format!("{value:.0}")))
}

pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(value) => format!("{value:.2}%"),
        None => "-".to_string(),
    }
}

fn format_with_commas(value: f64) -> String {
    let formatted = format!("{value:.2}");
    let parts: Vec<&str> = formatted.split('.').collect();
    let integer_part = parts[0];
    let decimal_part = parts.get(1).unwrap_or(&"00");

    format!("{}.{}", group_thousands(integer_part), decimal_part)
}

fn group_thousands(digits: &str) -> String {
    digits
        .chars()
        .rev()
        .collect::<String>()
        .chars()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(",")
        .chars()
        .rev()
        .collect::<String>()
}

/// Axis label for a trend point: `day/month`.
pub fn day_month_label(timestamp_ms: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(datetime) => {
            format!("{}/{}", datetime.day(), datetime.month())
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: &str, price: f64, change: Option<f64>, cap: f64) -> Asset {
        Asset {
            id: id.to_string(),
            name: id.to_string(),
            symbol: id[..3.min(id.len())].to_string(),
            current_price: price,
            price_change_percentage_24h: change,
            market_cap: cap,
        }
    }

    fn sample_snapshot() -> Vec<Asset> {
        vec![
            asset("bitcoin", 60000.0, Some(1.5), 1_200_000_000_000.0),
            asset("ethereum", 3000.0, Some(-2.1), 360_000_000_000.0),
            asset("tether", 1.0, Some(0.01), 90_000_000_000.0),
            asset("dogecoin", 0.12, Some(8.4), 17_000_000_000.0),
        ]
    }

    #[test]
    fn test_sort_market_cap_descending() {
        let mut snapshot = sample_snapshot();
        snapshot.reverse();
        let view = sorted(&snapshot, Some(SortKey::MarketCap));
        for pair in view.windows(2) {
            assert!(pair[0].market_cap >= pair[1].market_cap);
        }
        assert_eq!(view[0].id, "bitcoin");
    }

    #[test]
    fn test_sort_name_ascending_case_insensitive() {
        let mut snapshot = sample_snapshot();
        snapshot[0].name = "Bitcoin".to_string();
        snapshot[1].name = "ethereum".to_string();
        let view = sorted(&snapshot, Some(SortKey::Name));
        let names: Vec<_> = view.iter().map(|a| a.name.to_lowercase()).collect();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_sort_price_descending() {
        let view = sorted(&sample_snapshot(), Some(SortKey::Price));
        for pair in view.windows(2) {
            assert!(pair[0].current_price >= pair[1].current_price);
        }
    }

    #[test]
    fn test_sort_change_descending_missing_last() {
        let mut snapshot = sample_snapshot();
        snapshot[1].price_change_percentage_24h = None;
        let view = sorted(&snapshot, Some(SortKey::Change));
        assert_eq!(view[0].id, "dogecoin");
        assert_eq!(view.last().map(|a| a.id.as_str()), Some("ethereum"));
    }

    #[test]
    fn test_sort_is_stable() {
        let snapshot = vec![
            asset("a", 1.0, Some(0.0), 100.0),
            asset("b", 2.0, Some(0.0), 100.0),
            asset("c", 3.0, Some(0.0), 100.0),
        ];
        let view = sorted(&snapshot, Some(SortKey::MarketCap));
        let ids: Vec<_> = view.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_no_sort_key_keeps_fetch_order() {
        let snapshot = sample_snapshot();
        let view = sorted(&snapshot, None);
        assert_eq!(view, snapshot);
    }

    #[test]
    fn test_unknown_sort_key_fails_to_parse() {
        assert!(SortKey::from_str("volume").is_err());
        assert_eq!(SortKey::from_str("Market_Cap"), Ok(SortKey::MarketCap));
    }

    #[test]
    fn test_decode_markets_payload() {
        let payload = r#"[
            {
                "id": "bitcoin",
                "symbol": "btc",
                "name": "Bitcoin",
                "image": "https://example.invalid/btc.png",
                "current_price": 60123.45,
                "market_cap": 1187491737958,
                "market_cap_rank": 1,
                "price_change_percentage_24h": -0.52,
                "total_volume": 24034932815
            },
            {
                "id": "newcoin",
                "symbol": "new",
                "name": "New Coin",
                "current_price": 0.002,
                "market_cap": 1000,
                "price_change_percentage_24h": null
            }
        ]"#;
        let assets: Vec<Asset> = serde_json::from_str(payload).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].id, "bitcoin");
        assert_eq!(assets[0].price_change_percentage_24h, Some(-0.52));
        assert_eq!(assets[1].price_change_percentage_24h, None);
    }

    #[test]
    fn test_decode_market_chart_payload() {
        let payload = r#"{
            "prices": [[1700000000000, 36521.1], [1700003600000.0, 36544.8]],
            "market_caps": [[1700000000000, 713000000000]],
            "total_volumes": [[1700000000000, 16800000000]]
        }"#;
        let chart: MarketChart = serde_json::from_str(payload).unwrap();
        assert_eq!(chart.prices.len(), 2);
        assert_eq!(chart.prices[0].0 as i64, 1700000000000);
    }

    #[test]
    fn test_day_month_label() {
        // 2023-11-14T22:13:20Z
        assert_eq!(day_month_label(1700000000000), "14/11");
    }

    #[test]
    fn test_list_entry_format() {
        let entry = list_entry(&asset("bitcoin", 60123.45, Some(1.0), 0.0));
        assert_eq!(entry, "bitcoin (BIT) - $60,123.45");
    }

    #[test]
    fn test_format_amount_tiers() {
        assert_eq!(format_amount(1234567.891), "1,234,567.89");
        assert_eq!(format_amount(42.5), "42.50");
        assert_eq!(format_amount(0.1234), "0.1234");
        assert_eq!(format_amount(0.00012345), "0.00012345");
    }

    #[test]
    fn test_format_market_cap_and_change() {
        assert_eq!(format_market_cap(1187491737958.0), "$1,187,491,737,958");
        assert_eq!(format_change(Some(-0.519)), "-0.52%");
        assert_eq!(format_change(None), "-");
    }
}
