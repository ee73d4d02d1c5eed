//! Text formatting for the CLI table

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use super::{MonitorRow, MonitorView};

/// Compact number: `999`, `1.2K`, `3.45M`, `2B`
#[must_use]
pub fn format_compact(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1e12 {
        (value / 1e12, "T")
    } else if abs >= 1e9 {
        (value / 1e9, "B")
    } else if abs >= 1e6 {
        (value / 1e6, "M")
    } else if abs >= 1e3 {
        (value / 1e3, "K")
    } else {
        (value, "")
    };
    format!("{}{suffix}", trim_decimals(scaled, 2))
}

/// `format_compact` for optional values, `-` when absent
#[must_use]
pub fn format_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), format_compact)
}

fn trim_decimals(value: f64, places: usize) -> String {
    let s = format!("{value:.places$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Age of `then` as `now`, `5m`, `3h` or `2d`
#[must_use]
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes();
    let hours = minutes / 60;
    let days = hours / 24;
    if days > 0 {
        format!("{days}d")
    } else if hours > 0 {
        format!("{hours}h")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        "now".to_string()
    }
}

/// `ABCD...WXYZ` for addresses longer than 8 characters
#[must_use]
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 8 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Signed percentage with `places` decimals, `-` when absent
#[must_use]
pub fn format_percent(value: Option<f64>, places: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:+.places$}%"),
        _ => "-".to_string(),
    }
}

/// USD price; tiny prices keep enough digits to be readable
#[must_use]
pub fn format_price(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() && v.abs() >= 1.0 => format!("${v:.2}"),
        Some(v) if v.is_finite() => format!("${v:.6}"),
        _ => "-".to_string(),
    }
}

fn row_line(row: &MonitorRow, now: DateTime<Utc>) -> [String; 10] {
    let t = &row.token;
    let symbol = if t.symbol.is_empty() { "?" } else { t.symbol.as_str() };
    [
        if row.is_new { "*".to_string() } else { String::new() },
        symbol.to_string(),
        short_address(&t.address),
        t.grade.to_string(),
        t.discovered_at.map_or_else(|| "-".to_string(), |d| time_ago(d, now)),
        format_price(t.market.price_usd),
        format_percent(row.change_from_baseline, 2),
        format_percent(t.market.price_change_24h, 1),
        format_opt(t.market.volume_24h),
        format_opt(t.market.liquidity_usd),
    ]
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths.iter().copied())
        .map(|(c, w)| format!("{c:<w$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Plain-text table of a monitor view
#[must_use]
pub fn render_table(view: &MonitorView, now: DateTime<Utc>) -> String {
    const HEADERS: [&str; 10] = [
        "", "SYMBOL", "ADDRESS", "GRADE", "AGE", "PRICE", "SINCE CALL", "24H", "VOL 24H", "LIQ",
    ];

    let lines: Vec<[String; 10]> = view.rows.iter().map(|r| row_line(r, now)).collect();
    let mut widths = HEADERS.map(str::len);
    for line in &lines {
        for (w, cell) in widths.iter_mut().zip(line) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", table_line(HEADERS.iter().copied(), &widths));
    for line in &lines {
        let _ = writeln!(out, "{}", table_line(line.iter().map(String::as_str), &widths));
    }

    let status = &view.status;
    let _ = write!(
        out,
        "{} of {} tokens | {} | updated {}",
        view.rows.len(),
        view.total,
        if status.paused {
            "paused"
        } else if status.connected {
            "live"
        } else {
            "disconnected"
        },
        status
            .last_updated
            .map_or_else(|| "never".to_string(), |t| time_ago(t, now)),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_compact() {
        assert_eq!(format_compact(999.0), "999");
        assert_eq!(format_compact(12.5), "12.5");
        assert_eq!(format_compact(1_200.0), "1.2K");
        assert_eq!(format_compact(3_456_000.0), "3.46M");
        assert_eq!(format_compact(2_000_000_000.0), "2B");
        assert_eq!(format_compact(-1_500.0), "-1.5K");
        assert_eq!(format_opt(None), "-");
    }

    #[test]
    fn test_time_ago() {
        let now = Utc::now();
        assert_eq!(time_ago(now - chrono::Duration::seconds(30), now), "now");
        assert_eq!(time_ago(now - chrono::Duration::minutes(5), now), "5m");
        assert_eq!(time_ago(now - chrono::Duration::minutes(190), now), "3h");
        assert_eq!(time_ago(now - chrono::Duration::hours(49), now), "2d");
    }

    #[test]
    fn test_short_address() {
        assert_eq!(
            short_address("So11111111111111111111111111111111111111112"),
            "So11...1112"
        );
        assert_eq!(short_address("ABCDEFGH"), "ABCDEFGH");
    }

    #[test]
    fn test_percent_and_price() {
        assert_eq!(format_percent(Some(12.345), 1), "+12.3%");
        assert_eq!(format_percent(Some(-3.0), 2), "-3.00%");
        assert_eq!(format_percent(None, 1), "-");
        assert_eq!(format_price(Some(1.5)), "$1.50");
        assert_eq!(format_price(Some(0.000_123_4)), "$0.000123");
    }
}
