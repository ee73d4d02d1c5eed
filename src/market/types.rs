//! DexScreener response types

use alpha_core::TokenRecord;
use alpha_core::time::from_unix;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// `GET /latest/dex/tokens/{address}` response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokensResponse {
    /// Pairs for the token, `null` when DexScreener has none
    pub pairs: Option<Vec<PairSnapshot>>,
}

/// Per-window values (`m5`, `h1`, `h6`, `h24`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Windows<T> {
    /// Last 5 minutes
    pub m5: Option<T>,
    /// Last hour
    pub h1: Option<T>,
    /// Last 6 hours
    pub h6: Option<T>,
    /// Last 24 hours
    pub h24: Option<T>,
}

/// Buy/sell counts for one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxnCount {
    /// Buys
    pub buys: u64,
    /// Sells
    pub sells: u64,
}

/// Base or quote token of a pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairToken {
    /// Mint address
    pub address: String,
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
}

/// Pool liquidity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Liquidity {
    /// USD value of the pool
    #[serde(deserialize_with = "lenient_f64")]
    pub usd: Option<f64>,
}

/// Links published for a token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairInfo {
    /// Project websites
    pub websites: Vec<Link>,
    /// Social accounts
    pub socials: Vec<Link>,
}

/// A website or social link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    /// Link URL
    pub url: String,
    /// Social network (`twitter`, `telegram`, ...)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// One trading pair as reported by DexScreener
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PairSnapshot {
    /// Pair (pool) address
    pub pair_address: String,
    /// DEX identifier
    pub dex_id: String,
    /// DexScreener page for the pair
    pub url: Option<String>,
    /// Price in USD (sent as a string)
    #[serde(deserialize_with = "lenient_f64")]
    pub price_usd: Option<f64>,
    /// Price in the quote token (sent as a string)
    #[serde(deserialize_with = "lenient_f64")]
    pub price_native: Option<f64>,
    /// Price change per window, percent
    pub price_change: Windows<f64>,
    /// Transactions per window
    pub txns: Windows<TxnCount>,
    /// Volume per window, USD
    pub volume: Windows<f64>,
    /// Pool liquidity
    pub liquidity: Option<Liquidity>,
    /// Market cap, USD
    #[serde(deserialize_with = "lenient_f64")]
    pub market_cap: Option<f64>,
    /// Fully diluted valuation, USD
    #[serde(deserialize_with = "lenient_f64")]
    pub fdv: Option<f64>,
    /// Pair creation time, unix millis
    pub pair_created_at: Option<i64>,
    /// Base token
    pub base_token: PairToken,
    /// Quote token
    pub quote_token: PairToken,
    /// Published links
    pub info: Option<PairInfo>,
}

impl PairSnapshot {
    /// Pair creation time
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.pair_created_at.and_then(from_unix)
    }

    fn social(&self, kind: &str) -> Option<String> {
        self.info
            .as_ref()?
            .socials
            .iter()
            .find(|s| s.kind.as_deref() == Some(kind))
            .map(|s| s.url.clone())
    }

    /// Merge this pair's market fields into `record`.
    ///
    /// Grading fields are kept; an empty symbol or an unknown name is taken
    /// from the pair's base token.
    pub fn apply_to(&self, record: &mut TokenRecord) {
        let m = &mut record.market;
        m.price_usd = self.price_usd;
        m.price_native = self.price_native;

        m.price_change_5m = self.price_change.m5;
        m.price_change_1h = self.price_change.h1;
        m.price_change_6h = self.price_change.h6;
        m.price_change_24h = self.price_change.h24;

        m.buys_5m = self.txns.m5.map(|t| t.buys);
        m.buys_1h = self.txns.h1.map(|t| t.buys);
        m.buys_6h = self.txns.h6.map(|t| t.buys);
        m.buys_24h = self.txns.h24.map(|t| t.buys);
        m.sells_5m = self.txns.m5.map(|t| t.sells);
        m.sells_1h = self.txns.h1.map(|t| t.sells);
        m.sells_6h = self.txns.h6.map(|t| t.sells);
        m.sells_24h = self.txns.h24.map(|t| t.sells);

        m.volume_5m = self.volume.m5;
        m.volume_1h = self.volume.h1;
        m.volume_6h = self.volume.h6;
        m.volume_24h = self.volume.h24;

        m.liquidity_usd = self.liquidity.as_ref().and_then(|l| l.usd);
        m.marketcap = self.market_cap;
        m.fdv = self.fdv;

        m.pair_address = Some(self.pair_address.clone()).filter(|a| !a.is_empty());
        m.pair_created_at = self.created_at();
        m.dex = Some(self.dex_id.clone()).filter(|d| !d.is_empty());

        m.base_token_name = non_empty(&self.base_token.name);
        m.base_token_symbol = non_empty(&self.base_token.symbol);
        m.quote_token_name = non_empty(&self.quote_token.name);
        m.quote_token_symbol = non_empty(&self.quote_token.symbol);

        m.website = self
            .info
            .as_ref()
            .and_then(|i| i.websites.first())
            .map(|w| w.url.clone());
        m.twitter = self.social("twitter");
        m.telegram = self.social("telegram");

        if let Some(url) = self.url.as_ref().filter(|u| !u.is_empty()) {
            record.dexscreener_url.clone_from(url);
        }
        if record.symbol.is_empty() && !self.base_token.symbol.is_empty() {
            record.symbol.clone_from(&self.base_token.symbol);
        }
        if (record.name.is_empty() || record.name == "Unknown") && !self.base_token.name.is_empty() {
            record.name.clone_from(&self.base_token.name);
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    Some(s.to_string()).filter(|s| !s.is_empty())
}

/// Accept numbers, numeric strings or null
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAIR: &str = r#"{
        "chainId": "solana",
        "dexId": "raydium",
        "url": "https://dexscreener.com/solana/pool1",
        "pairAddress": "pool1",
        "baseToken": {"address": "Mint1", "name": "Dog Wif Hat", "symbol": "WIF"},
        "quoteToken": {"address": "So11111111111111111111111111111111111111112", "name": "Wrapped SOL", "symbol": "SOL"},
        "priceNative": "0.0123",
        "priceUsd": "1.85",
        "txns": {"m5": {"buys": 3, "sells": 1}, "h24": {"buys": 900, "sells": 450}},
        "volume": {"h24": 125000.5, "m5": 300},
        "priceChange": {"h1": -2.5, "h24": 14.1},
        "liquidity": {"usd": 80000, "base": 1, "quote": 2},
        "fdv": 1850000,
        "marketCap": 1700000,
        "pairCreatedAt": 1704067200000,
        "info": {
            "websites": [{"label": "Website", "url": "https://wif.example"}],
            "socials": [{"type": "telegram", "url": "https://t.me/wif"}, {"type": "twitter", "url": "https://x.com/wif"}]
        }
    }"#;

    #[test]
    fn test_pair_parses_string_prices_and_millis() {
        let pair: PairSnapshot = serde_json::from_str(PAIR).unwrap();
        assert_eq!(pair.price_usd, Some(1.85));
        assert_eq!(pair.price_native, Some(0.0123));
        assert_eq!(pair.txns.m5, Some(TxnCount { buys: 3, sells: 1 }));
        assert_eq!(pair.txns.h1, None);
        assert_eq!(
            pair.created_at().unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_apply_to_fills_market_fields() {
        let pair: PairSnapshot = serde_json::from_str(PAIR).unwrap();
        let mut record = TokenRecord::new("Mint1");
        record.overlap_percentage = 42.0;
        pair.apply_to(&mut record);

        assert_eq!(record.overlap_percentage, 42.0);
        assert_eq!(record.symbol, "WIF");
        assert_eq!(record.name, "Dog Wif Hat");
        assert_eq!(record.dexscreener_url, "https://dexscreener.com/solana/pool1");
        assert_eq!(record.market.price_usd, Some(1.85));
        assert_eq!(record.market.buys_24h, Some(900));
        assert_eq!(record.market.sells_5m, Some(1));
        assert_eq!(record.market.volume_24h, Some(125_000.5));
        assert_eq!(record.market.price_change_24h, Some(14.1));
        assert_eq!(record.market.liquidity_usd, Some(80_000.0));
        assert_eq!(record.market.marketcap, Some(1_700_000.0));
        assert_eq!(record.market.dex.as_deref(), Some("raydium"));
        assert_eq!(record.market.quote_token_symbol.as_deref(), Some("SOL"));
        assert_eq!(record.market.website.as_deref(), Some("https://wif.example"));
        assert_eq!(record.market.twitter.as_deref(), Some("https://x.com/wif"));
        assert_eq!(record.market.telegram.as_deref(), Some("https://t.me/wif"));
        assert!(record.is_enriched());
    }

    #[test]
    fn test_null_pairs_and_garbage_prices() {
        let resp: TokensResponse =
            serde_json::from_str(r#"{"schemaVersion":"1.0.0","pairs":null}"#).unwrap();
        assert!(resp.pairs.is_none());

        let pair: PairSnapshot =
            serde_json::from_str(r#"{"pairAddress":"p","priceUsd":"n/a","fdv":null}"#).unwrap();
        assert_eq!(pair.price_usd, None);
        assert_eq!(pair.fdv, None);
        assert_eq!(pair.created_at(), None);
    }
}
