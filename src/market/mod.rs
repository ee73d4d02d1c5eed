//! Market enrichment
//!
//! Looks tokens up on DexScreener to merge live price, volume and liquidity
//! into graded records, and to check that a token's pair is young enough to
//! be analyzed.

mod types;

pub use types::{Link, Liquidity, PairInfo, PairSnapshot, PairToken, TokensResponse, TxnCount, Windows};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alpha_core::TokenRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::MarketConfig;
use crate::{Error, Result};

/// Source of pair data for a token
#[async_trait]
pub trait MarketData: Send + Sync {
    /// The token's primary pair, or `None` when it has no pairs
    async fn token_pair(&self, address: &str) -> Result<Option<PairSnapshot>>;
}

/// DexScreener REST client
pub struct DexScreenerClient {
    client: Client,
    base_url: String,
}

impl DexScreenerClient {
    /// Create a client for `base_url` (normally `https://api.dexscreener.com`)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build market client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn tokens_url(&self, address: &str) -> String {
        format!("{}/latest/dex/tokens/{address}", self.base_url)
    }
}

#[async_trait]
impl MarketData for DexScreenerClient {
    async fn token_pair(&self, address: &str) -> Result<Option<PairSnapshot>> {
        let response = self.client.get(self.tokens_url(address)).send().await?;
        let response = response.error_for_status()?;
        let body: TokensResponse = response.json().await?;
        Ok(body.pairs.and_then(|pairs| pairs.into_iter().next()))
    }
}

/// Build the configured market client, `None` when enrichment is disabled
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn from_config(config: &MarketConfig) -> Result<Option<Arc<dyn MarketData>>> {
    if !config.enabled {
        info!("Market enrichment disabled");
        return Ok(None);
    }
    let client = DexScreenerClient::new(&config.base_url, config.timeout)?;
    Ok(Some(Arc::new(client)))
}

/// Merge market data into `record`.
///
/// Best effort: on lookup failure or when the token has no pair the record
/// comes back unchanged.
pub async fn enrich(market: &dyn MarketData, mut record: TokenRecord) -> TokenRecord {
    match market.token_pair(&record.address).await {
        Ok(Some(pair)) => pair.apply_to(&mut record),
        Ok(None) => debug!(address = %record.address, "No pair found"),
        Err(e) => warn!(address = %record.address, error = %e, "Market lookup failed"),
    }
    record
}

/// Enrich all records concurrently, preserving order
pub async fn enrich_all(market: &dyn MarketData, records: Vec<TokenRecord>) -> Vec<TokenRecord> {
    join_all(records.into_iter().map(|r| enrich(market, r))).await
}

/// Outcome of a freshness check
#[derive(Debug, Clone, PartialEq)]
pub enum Freshness {
    /// Pair exists and is within the allowed age
    Fresh {
        /// Pair age
        age: chrono::Duration,
    },
    /// Pair is older than allowed
    Stale {
        /// Pair age
        age: chrono::Duration,
    },
    /// No pair on the market-data API
    NoPair,
    /// Pair has no creation time
    UnknownAge,
    /// The lookup itself failed
    LookupFailed(String),
}

impl Freshness {
    /// Only [`Freshness::Fresh`] passes
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh { age } => write!(f, "fresh ({}h old)", age.num_hours()),
            Self::Stale { age } => write!(f, "pair is {}h old", age.num_hours()),
            Self::NoPair => write!(f, "no trading pair found"),
            Self::UnknownAge => write!(f, "pair creation time unknown"),
            Self::LookupFailed(e) => write!(f, "lookup failed: {e}"),
        }
    }
}

/// Check that `address` has a pair created no more than `max_age` before `now`
pub async fn check_freshness(
    market: &dyn MarketData,
    address: &str,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Freshness {
    let pair = match market.token_pair(address).await {
        Ok(Some(pair)) => pair,
        Ok(None) => return Freshness::NoPair,
        Err(e) => return Freshness::LookupFailed(e.to_string()),
    };
    let Some(created) = pair.created_at() else {
        return Freshness::UnknownAge;
    };

    let age = now - created;
    let limit = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
    if age <= limit {
        Freshness::Fresh { age }
    } else {
        Freshness::Stale { age }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TWO_DAYS: Duration = Duration::from_secs(2 * 86_400);

    /// Pairs keyed by address; addresses starting with `err` fail
    #[derive(Default)]
    struct FakeMarket {
        pairs: HashMap<String, PairSnapshot>,
        calls: AtomicUsize,
    }

    impl FakeMarket {
        fn with(mut self, address: &str, price: f64, created_ms: Option<i64>) -> Self {
            let pair = PairSnapshot {
                pair_address: format!("pool-{address}"),
                price_usd: Some(price),
                pair_created_at: created_ms,
                ..Default::default()
            };
            self.pairs.insert(address.to_string(), pair);
            self
        }
    }

    #[async_trait]
    impl MarketData for FakeMarket {
        async fn token_pair(&self, address: &str) -> Result<Option<PairSnapshot>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if address.starts_with("err") {
                return Err(Error::Transport("connection reset".into()));
            }
            Ok(self.pairs.get(address).cloned())
        }
    }

    #[tokio::test]
    async fn test_enrich_is_best_effort() {
        let market = FakeMarket::default().with("A", 2.0, None);

        let enriched = enrich(&market, TokenRecord::new("A")).await;
        assert_eq!(enriched.market.price_usd, Some(2.0));

        let original = TokenRecord::new("err-1");
        assert_eq!(enrich(&market, original.clone()).await, original);

        let original = TokenRecord::new("missing");
        assert_eq!(enrich(&market, original.clone()).await, original);
    }

    #[tokio::test]
    async fn test_enrich_all_preserves_order() {
        let market = FakeMarket::default().with("A", 1.0, None).with("C", 3.0, None);
        let records = ["A", "err-B", "C"].map(TokenRecord::new).to_vec();

        let out = enrich_all(&market, records).await;
        let ids: Vec<_> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "err-B", "C"]);
        assert_eq!(out[0].market.price_usd, Some(1.0));
        assert_eq!(out[1].market.price_usd, None);
        assert_eq!(out[2].market.price_usd, Some(3.0));
        assert_eq!(market.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_freshness_window() {
        let now = DateTime::parse_from_rfc3339("2024-01-03T00:00:00Z").unwrap().to_utc();
        let day_ms = 86_400_000;
        let now_ms = now.timestamp_millis();
        let market = FakeMarket::default()
            .with("young", 1.0, Some(now_ms - day_ms))
            .with("edge", 1.0, Some(now_ms - 2 * day_ms))
            .with("old", 1.0, Some(now_ms - 3 * day_ms))
            .with("undated", 1.0, None);

        assert!(check_freshness(&market, "young", now, TWO_DAYS).await.is_fresh());
        assert!(check_freshness(&market, "edge", now, TWO_DAYS).await.is_fresh());
        assert!(matches!(
            check_freshness(&market, "old", now, TWO_DAYS).await,
            Freshness::Stale { .. }
        ));
        assert_eq!(check_freshness(&market, "undated", now, TWO_DAYS).await, Freshness::UnknownAge);
        assert_eq!(check_freshness(&market, "nothing", now, TWO_DAYS).await, Freshness::NoPair);
        assert!(matches!(
            check_freshness(&market, "err-x", now, TWO_DAYS).await,
            Freshness::LookupFailed(_)
        ));
    }

    #[test]
    fn test_tokens_url() {
        let client = DexScreenerClient::new("https://api.dexscreener.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.tokens_url("Mint1"),
            "https://api.dexscreener.com/latest/dex/tokens/Mint1"
        );
    }
}
