//! Token record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grade::Grade;

/// DexScreener page for a Solana token
#[must_use]
pub fn dexscreener_url(address: &str) -> String {
    format!("https://dexscreener.com/solana/{address}")
}

/// A graded token, optionally enriched with live market data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TokenRecord {
    /// Mint address, used as the identifier
    pub id: String,
    /// Token symbol
    #[serde(default)]
    pub symbol: String,
    /// Token name
    #[serde(default)]
    pub name: String,
    /// Mint address
    #[serde(default)]
    pub address: String,
    /// Overlap grade
    #[serde(default)]
    pub grade: Grade,
    /// Share of holders overlapping with tracked wallets
    #[serde(default)]
    pub overlap_percentage: f64,
    /// Holder concentration
    #[serde(default)]
    pub concentration: f64,
    /// When the grading process last checked this token
    #[serde(default)]
    pub discovered_at: Option<DateTime<Utc>>,
    /// DexScreener page (pair page once enriched)
    #[serde(default)]
    pub dexscreener_url: String,

    /// Live market metrics, absent until enrichment succeeds
    #[serde(flatten)]
    pub market: MarketMetrics,
}

/// Market fields filled in from the market-data API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MarketMetrics {
    /// Current price in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,
    /// Current price in the quote token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_native: Option<f64>,

    /// Price change over 5 minutes (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_change_5m: Option<f64>,
    /// Price change over 1 hour (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_change_1h: Option<f64>,
    /// Price change over 6 hours (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_change_6h: Option<f64>,
    /// Price change over 24 hours (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_change_24h: Option<f64>,

    /// Buys in the last 5 minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buys_5m: Option<u64>,
    /// Buys in the last hour
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buys_1h: Option<u64>,
    /// Buys in the last 6 hours
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buys_6h: Option<u64>,
    /// Buys in the last 24 hours
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buys_24h: Option<u64>,
    /// Sells in the last 5 minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sells_5m: Option<u64>,
    /// Sells in the last hour
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sells_1h: Option<u64>,
    /// Sells in the last 6 hours
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sells_6h: Option<u64>,
    /// Sells in the last 24 hours
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sells_24h: Option<u64>,

    /// USD volume over 5 minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_5m: Option<f64>,
    /// USD volume over 1 hour
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_1h: Option<f64>,
    /// USD volume over 6 hours
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_6h: Option<f64>,
    /// USD volume over 24 hours
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<f64>,

    /// Pool liquidity in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity_usd: Option<f64>,
    /// Market cap in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marketcap: Option<f64>,
    /// Fully-diluted valuation in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fdv: Option<f64>,

    /// Pair (pool) address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_address: Option<String>,
    /// When the pair was created on-chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_created_at: Option<DateTime<Utc>>,
    /// DEX identifier (raydium, pumpswap, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dex: Option<String>,

    /// Base token name reported by the pair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_token_name: Option<String>,
    /// Base token symbol reported by the pair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_token_symbol: Option<String>,
    /// Quote token name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_token_name: Option<String>,
    /// Quote token symbol
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_token_symbol: Option<String>,

    /// Project website
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Twitter / X link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    /// Telegram link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
}

impl TokenRecord {
    /// Create an un-enriched record for `address`
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            id: address.clone(),
            dexscreener_url: dexscreener_url(&address),
            address,
            name: "Unknown".to_string(),
            ..Self::default()
        }
    }

    /// Case-insensitive substring match on name or symbol.
    ///
    /// `needle` must already be lowercase.
    #[must_use]
    pub fn matches_search(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.name.to_lowercase().contains(needle)
            || self.symbol.to_lowercase().contains(needle)
    }

    /// Whether market data has been merged in
    #[must_use]
    pub fn is_enriched(&self) -> bool {
        self.market.pair_address.is_some() || self.market.price_usd.is_some()
    }
}
