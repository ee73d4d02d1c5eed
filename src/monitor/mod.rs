//! Token monitor
//!
//! Keeps an enriched copy of the overlap feed up to date on a timer and
//! derives filtered, sorted table views from it. Refreshing stops while the
//! monitor is paused or its viewer is away, and resumes with an immediate
//! refresh when either flag flips back.

mod baseline;
mod filter;
pub mod render;

pub use baseline::{BaselineStore, change_from_baseline, write_document};
pub use filter::{FilterState, SortKey};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use alpha_core::TokenRecord;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::market::{MarketData, enrich_all};
use crate::storage::{DataSource, TokenFeedReader};

/// Pause and visibility flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    /// Refreshing suspended by the user
    pub paused: bool,
    /// Someone is looking at the view
    pub visible: bool,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            paused: false,
            visible: true,
        }
    }
}

impl Control {
    /// Refreshes are scheduled only when active
    #[must_use]
    pub fn is_active(self) -> bool {
        !self.paused && self.visible
    }
}

/// Monitor health, as shown next to the table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorStatus {
    /// Refreshing suspended by the user
    pub paused: bool,
    /// Viewer present
    pub visible: bool,
    /// Last refresh reached storage
    pub connected: bool,
    /// Time of the last refresh
    pub last_updated: Option<DateTime<Utc>>,
    /// Source of the current rows
    pub data_source: Option<DataSource>,
    /// Completed refreshes
    pub refreshes: u64,
    /// Tokens with a baseline price
    pub baselines: usize,
}

/// One table row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorRow {
    /// Token record
    #[serde(flatten)]
    pub token: TokenRecord,
    /// First-seen price
    pub baseline_price: Option<f64>,
    /// Percent change since the baseline
    pub change_from_baseline: Option<f64>,
    /// Appeared in a recent refresh
    pub is_new: bool,
}

/// Filtered, sorted rows plus status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorView {
    /// Rows passing the filter, in display order
    pub rows: Vec<MonitorRow>,
    /// Rows before filtering
    pub total: usize,
    /// Filter that produced this view
    pub filter: FilterState,
    /// Monitor health
    pub status: MonitorStatus,
}

#[derive(Default)]
struct FeedState {
    tokens: Vec<TokenRecord>,
    seen: HashSet<String>,
    new_since: HashMap<String, Instant>,
    connected: bool,
    last_updated: Option<DateTime<Utc>>,
    data_source: Option<DataSource>,
    refreshes: u64,
}

/// Refresh loop state shared by the server and the CLI
pub struct Monitor {
    reader: TokenFeedReader,
    market: Option<Arc<dyn MarketData>>,
    baselines: Mutex<BaselineStore>,
    save_lock: tokio::sync::Mutex<()>,
    feed: RwLock<FeedState>,
    control: watch::Sender<Control>,
    refresh_interval: Duration,
    highlight_for: Duration,
}

impl Monitor {
    /// Monitor over `reader`, enriching through `market` when set
    pub fn new(
        reader: TokenFeedReader,
        market: Option<Arc<dyn MarketData>>,
        baselines: BaselineStore,
        config: &MonitorConfig,
    ) -> Self {
        let (control, _) = watch::channel(Control::default());
        Self {
            reader,
            market,
            baselines: Mutex::new(baselines),
            save_lock: tokio::sync::Mutex::new(()),
            feed: RwLock::new(FeedState::default()),
            control,
            refresh_interval: config.refresh_interval,
            highlight_for: config.highlight_for,
        }
    }

    /// Current flags
    #[must_use]
    pub fn control(&self) -> Control {
        *self.control.borrow()
    }

    /// Update the pause and visibility flags; unset fields keep their value
    pub fn set_control(&self, paused: Option<bool>, visible: Option<bool>) -> Control {
        self.control.send_if_modified(|c| {
            let before = *c;
            if let Some(p) = paused {
                c.paused = p;
            }
            if let Some(v) = visible {
                c.visible = v;
            }
            *c != before
        });
        let now = self.control();
        debug!(paused = now.paused, visible = now.visible, "Monitor control updated");
        now
    }

    /// Run one refresh: read the feed, enrich it, update baselines and
    /// new-row markers.
    ///
    /// A failed read leaves baselines and new-row markers untouched, and
    /// sample rows are never sent to the market.
    pub async fn refresh(&self) {
        let snapshot = self.reader.load().await;
        let failed = snapshot.fetch_failed;
        let sample = snapshot.is_sample();
        let tokens = match &self.market {
            Some(market) if !sample => enrich_all(market.as_ref(), snapshot.tokens).await,
            _ => snapshot.tokens,
        };

        if !failed {
            // sample rows stand in for an empty feed
            let observed: &[TokenRecord] = if sample { &[] } else { &tokens };
            // observe and write under one lock so saves land in refresh order
            let _saving = self.save_lock.lock().await;
            let to_save = {
                let mut baselines = self.baselines.lock();
                baselines
                    .observe(observed)
                    .then(|| (baselines.path().to_path_buf(), baselines.prices()))
            };
            if let Some((path, prices)) = to_save {
                if let Err(e) = write_document(&path, &prices).await {
                    warn!(path = %path.display(), error = %e, "Failed to save baseline prices");
                }
            }
        }

        let now = Instant::now();
        let mut feed = self.feed.write();
        let first = feed.refreshes == 0;
        let fresh_ids: Vec<String> = if failed {
            Vec::new()
        } else {
            tokens
                .iter()
                .filter(|t| !feed.seen.contains(&t.id))
                .map(|t| t.id.clone())
                .collect()
        };
        if !first {
            for id in &fresh_ids {
                feed.new_since.insert(id.clone(), now);
            }
        }
        let highlight_for = self.highlight_for;
        feed.new_since.retain(|_, at| now.duration_since(*at) < highlight_for);
        if !failed {
            feed.seen = tokens.iter().map(|t| t.id.clone()).collect();
        }

        feed.connected = !failed;
        feed.last_updated = Some(snapshot.last_updated);
        feed.data_source = Some(snapshot.data_source);
        feed.refreshes += 1;
        feed.tokens = tokens;

        if failed {
            warn!(source = ?snapshot.data_source, "Monitor refresh could not read the feed");
        } else {
            info!(
                tokens = feed.tokens.len(),
                new = if first { 0 } else { fresh_ids.len() },
                source = ?snapshot.data_source,
                "Monitor refreshed"
            );
        }
    }

    /// Status fields
    #[must_use]
    pub fn status(&self) -> MonitorStatus {
        let control = self.control();
        let feed = self.feed.read();
        MonitorStatus {
            paused: control.paused,
            visible: control.visible,
            connected: feed.connected,
            last_updated: feed.last_updated,
            data_source: feed.data_source,
            refreshes: feed.refreshes,
            baselines: self.baselines.lock().len(),
        }
    }

    /// Rows matching `filter`, sorted by it
    #[must_use]
    pub fn view(&self, filter: &FilterState) -> MonitorView {
        let status = self.status();
        let now = Instant::now();
        let feed = self.feed.read();
        let baselines = self.baselines.lock();

        let mut rows: Vec<MonitorRow> = feed
            .tokens
            .iter()
            .filter(|t| filter.matches(t))
            .map(|t| {
                let baseline_price = baselines.get(&t.id);
                MonitorRow {
                    token: t.clone(),
                    baseline_price,
                    change_from_baseline: change_from_baseline(baseline_price, t.market.price_usd),
                    is_new: feed
                        .new_since
                        .get(&t.id)
                        .is_some_and(|at| now.duration_since(*at) < self.highlight_for),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            filter.compare(&a.token, a.change_from_baseline, &b.token, b.change_from_baseline)
        });

        MonitorView {
            rows,
            total: feed.tokens.len(),
            filter: filter.clone(),
            status,
        }
    }

    /// Refresh on every tick while active; a switch back to active
    /// refreshes at once. Returns when `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut control = self.control.subscribe();
        let mut ticker = interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(every = ?self.refresh_interval, "Token monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.control().is_active() {
                        self.refresh().await;
                    }
                }
                changed = control.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let flags = *control.borrow_and_update();
                    if flags.is_active() {
                        debug!("Monitor resumed, refreshing now");
                        self.refresh().await;
                        ticker.reset();
                    }
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }
        info!("Token monitor stopped");
    }
}
