//! Trader ROI analyses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Body of an analysis request, as accepted by the dashboard and
/// forwarded to the analysis backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Token mint addresses to analyze (1 to 3)
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Trader classification (`"all"`, `"early"`, ...)
    #[serde(default = "default_trader_type")]
    pub trader_type: String,
    /// Minimum buy size in USD
    #[serde(default)]
    pub min_buy: f64,
    /// Minimum number of analyzed tokens a trader must be in profit on
    #[serde(default = "default_min_tokens")]
    pub min_num_tokens_in_profit: u32,
    /// Optional look-back window (`"24h"`, `"7d"`, or hours as a number)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_window"
    )]
    pub window: Option<String>,
}

fn default_trader_type() -> String {
    "all".to_string()
}

fn default_min_tokens() -> u32 {
    1
}

fn deserialize_window<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Parameters an analysis was run with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisParams {
    /// Trader classification
    pub trader_type: String,
    /// Minimum buy size in USD
    pub min_buy: f64,
    /// Minimum profitable-token count
    pub min_num_tokens_in_profit: u32,
    /// Optional look-back window
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_window")]
    pub window: Option<String>,
}

impl From<&AnalysisRequest> for AnalysisParams {
    fn from(req: &AnalysisRequest) -> Self {
        Self {
            trader_type: req.trader_type.clone(),
            min_buy: req.min_buy,
            min_num_tokens_in_profit: req.min_num_tokens_in_profit,
            window: req.window.clone(),
        }
    }
}

/// One trader's performance across the analyzed tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TraderRecord {
    /// Wallet address
    #[serde(alias = "trader", alias = "address")]
    pub wallet: String,
    /// Realized profit/loss in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<f64>,
    /// Unrealized profit/loss in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrealized_pnl: Option<f64>,
    /// Total profit/loss in USD
    #[serde(alias = "pnl", skip_serializing_if = "Option::is_none")]
    pub total_pnl: Option<f64>,
    /// Return on investment (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi: Option<f64>,
    /// USD spent buying
    #[serde(alias = "spent", skip_serializing_if = "Option::is_none")]
    pub total_spent: Option<f64>,
    /// USD received selling
    #[serde(alias = "revenue", skip_serializing_if = "Option::is_none")]
    pub total_revenue: Option<f64>,
    /// Buy count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_buys: Option<u64>,
    /// Sell count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_sells: Option<u64>,
    /// Share of profitable trades (0-100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
    /// Number of analyzed tokens this trader is in profit on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_in_profit: Option<u32>,
    /// Fields this model does not know about
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A completed ROI analysis produced by the external backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisResult {
    /// Result identity (backend id, job id or archive file stem)
    #[serde(default, alias = "analysis_id")]
    pub id: String,
    /// When the analysis was produced
    #[serde(
        default,
        alias = "created_at",
        deserialize_with = "crate::time::deserialize_lenient"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    /// Parameters used
    #[serde(default)]
    pub params: AnalysisParams,
    /// Token addresses analyzed
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Per-trader performance
    #[serde(default)]
    pub records: Vec<TraderRecord>,
    /// Fields this model does not know about
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisResult {
    /// Fill identity, timestamp, params and tokens from the request that
    /// produced this result, keeping anything the backend already set
    pub fn fill_from_request(&mut self, id: &str, req: &AnalysisRequest) {
        if self.id.is_empty() {
            self.id = id.to_string();
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        if self.params.trader_type.is_empty() {
            self.params = AnalysisParams::from(req);
        }
        if self.tokens.is_empty() {
            self.tokens.clone_from(&req.tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_and_numeric_window() {
        let req: AnalysisRequest =
            serde_json::from_str(r#"{"tokens":["AddrX"],"min_buy":100,"window":24}"#).unwrap();
        assert_eq!(req.trader_type, "all");
        assert_eq!(req.min_num_tokens_in_profit, 1);
        assert_eq!(req.window.as_deref(), Some("24"));
    }

    #[test]
    fn test_result_tolerates_missing_records_and_unknown_fields() {
        let result: AnalysisResult = serde_json::from_str(
            r#"{"analysis_id":"a1","created_at":"2024-05-01T12:00:00","summary":{"n":3}}"#,
        )
        .unwrap();
        assert_eq!(result.id, "a1");
        assert!(result.records.is_empty());
        assert!(result.timestamp.is_some());
        assert_eq!(result.extra["summary"]["n"], 3);
    }

    #[test]
    fn test_trader_record_aliases() {
        let record: TraderRecord = serde_json::from_str(
            r#"{"trader":"W1","pnl":12.5,"spent":100,"revenue":112.5,"roi":12.5,"rank":1}"#,
        )
        .unwrap();
        assert_eq!(record.wallet, "W1");
        assert_eq!(record.total_pnl, Some(12.5));
        assert_eq!(record.total_spent, Some(100.0));
        assert_eq!(record.extra["rank"], 1);
    }

    #[test]
    fn test_fill_from_request_keeps_backend_values() {
        let req = AnalysisRequest {
            tokens: vec!["A".into()],
            trader_type: "all".into(),
            min_buy: 50.0,
            min_num_tokens_in_profit: 1,
            window: None,
        };
        let mut result = AnalysisResult {
            id: "backend-id".into(),
            ..Default::default()
        };
        result.fill_from_request("job-1", &req);
        assert_eq!(result.id, "backend-id");
        assert_eq!(result.tokens, vec!["A".to_string()]);
        assert_eq!(result.params.min_buy, 50.0);
        assert!(result.timestamp.is_some());
    }
}
