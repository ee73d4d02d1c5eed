//! Search, grade filter and sort order for the token table

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use alpha_core::{Grade, TokenRecord};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Column the table is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Discovery time
    #[default]
    Discovered,
    /// Grade severity
    Grade,
    /// Current USD price
    Price,
    /// 24h price change
    Change24h,
    /// 24h volume
    Volume24h,
    /// Liquidity
    Liquidity,
    /// Market cap
    MarketCap,
    /// Change since the baseline price
    ChangeFromBaseline,
}

impl SortKey {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Grade => "grade",
            Self::Price => "price",
            Self::Change24h => "change_24h",
            Self::Volume24h => "volume_24h",
            Self::Liquidity => "liquidity",
            Self::MarketCap => "market_cap",
            Self::ChangeFromBaseline => "change_from_baseline",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "discovered" | "discovered_at" | "time" => Self::Discovered,
            "grade" => Self::Grade,
            "price" | "price_usd" => Self::Price,
            "change_24h" | "change" => Self::Change24h,
            "volume_24h" | "volume" => Self::Volume24h,
            "liquidity" | "liquidity_usd" => Self::Liquidity,
            "market_cap" | "marketcap" | "mcap" => Self::MarketCap,
            "change_from_baseline" | "since_call" | "baseline" => Self::ChangeFromBaseline,
            other => return Err(Error::Validation(format!("unknown sort key: {other}"))),
        })
    }
}

/// What the user has chosen to see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    /// Case-insensitive substring over name and symbol
    pub search: String,
    /// Grades shown
    pub grades: BTreeSet<Grade>,
    /// Sort column
    pub sort: SortKey,
    /// Descending when true
    pub descending: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search: String::new(),
            grades: Grade::ALL.into_iter().collect(),
            sort: SortKey::default(),
            descending: true,
        }
    }
}

impl FilterState {
    /// Parse a comma separated grade list; empty means all grades
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown grade label.
    pub fn parse_grades(list: &str) -> Result<BTreeSet<Grade>> {
        let grades = list
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(|g| g.parse::<Grade>().map_err(|_| Error::Validation(format!("unknown grade: {g}"))))
            .collect::<Result<BTreeSet<_>>>()?;
        if grades.is_empty() {
            Ok(Grade::ALL.into_iter().collect())
        } else {
            Ok(grades)
        }
    }

    /// Whether `record` passes the search and grade filters
    #[must_use]
    pub fn matches(&self, record: &TokenRecord) -> bool {
        self.grades.contains(&record.grade)
            && record.matches_search(&self.search.trim().to_lowercase())
    }

    /// Ordering of two rows under this state; `change` gives each row's
    /// change from baseline
    #[must_use]
    pub fn compare(
        &self,
        a: &TokenRecord,
        a_change: Option<f64>,
        b: &TokenRecord,
        b_change: Option<f64>,
    ) -> Ordering {
        let ord = match self.sort {
            SortKey::Discovered => a.discovered_at.cmp(&b.discovered_at),
            SortKey::Grade => a.grade.cmp(&b.grade),
            SortKey::Price => cmp_f64(a.market.price_usd, b.market.price_usd),
            SortKey::Change24h => cmp_f64(a.market.price_change_24h, b.market.price_change_24h),
            SortKey::Volume24h => cmp_f64(a.market.volume_24h, b.market.volume_24h),
            SortKey::Liquidity => cmp_f64(a.market.liquidity_usd, b.market.liquidity_usd),
            SortKey::MarketCap => cmp_f64(a.market.marketcap, b.market.marketcap),
            SortKey::ChangeFromBaseline => cmp_f64(a_change, b_change),
        };
        if self.descending { ord.reverse() } else { ord }
    }
}

/// Missing values compare lowest
fn cmp_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}
