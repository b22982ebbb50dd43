// src/monitor.rs
//! The polling cycle: fetch every feed in turn, extract, keep the unseen
//! items, notify once, persist. One `Monitor` owns the store for the whole
//! process; nothing else touches it.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::time::MissedTickBehavior;
use tracing::Span;

use crate::config::{Config, FeedConfig};
use crate::error::DeliveryError;
use crate::ingest::assemble_item;
use crate::ingest::types::{FeedSource, Item};
use crate::notify::{CycleSummary, Notifier};
use crate::store::SeenStore;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_cycles_total", "Completed polling cycles.");
        describe_counter!("monitor_new_items_total", "New missions accepted for notification.");
        describe_counter!("monitor_delivered_items_total", "Missions delivered to the webhook.");
        describe_counter!("monitor_feed_errors_total", "Feed fetch/parse failures.");
        describe_counter!("monitor_entries_skipped_total", "Entries skipped for missing fields.");
        describe_counter!(
            "monitor_items_dropped_total",
            "New missions left for a later cycle by the per-check cap."
        );
        describe_counter!("monitor_persist_errors_total", "Failed state saves.");
        describe_gauge!("monitor_last_cycle_ts", "Unix ts of the last completed cycle.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching(usize),
    Extracting,
    Deduplicating,
    Notifying,
    Persisting,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub feeds: Vec<FeedConfig>,
    pub max_items_per_check: usize,
    pub send_summary: bool,
}

impl From<&Config> for MonitorSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            feeds: cfg.rss_feeds.clone(),
            max_items_per_check: cfg.surveillance.max_items_per_check,
            send_summary: cfg.surveillance.send_summary,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub new_items: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub skipped_entries: usize,
    pub feeds_processed: Vec<String>,
    pub feeds_failed: Vec<String>,
    pub persisted: bool,
}

impl CycleReport {
    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            total_new: self.new_items,
            feed_names: self.feeds_processed.clone(),
        }
    }
}

pub struct Monitor {
    settings: MonitorSettings,
    store: SeenStore,
    source: Box<dyn FeedSource>,
    notifier: Box<dyn Notifier>,
    phase: Phase,
    span: Span,
}

fn set_phase(phase: &mut Phase, span: &Span, next: Phase) {
    *phase = next;
    tracing::trace!(parent: span, phase = ?next, "cycle phase");
}

impl Monitor {
    pub fn new(
        settings: MonitorSettings,
        store: SeenStore,
        source: Box<dyn FeedSource>,
        notifier: Box<dyn Notifier>,
        span: Span,
    ) -> Self {
        ensure_metrics_described();
        Self {
            settings,
            store,
            source,
            notifier,
            phase: Phase::Idle,
            span,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn store(&self) -> &SeenStore {
        &self.store
    }

    pub async fn test_webhook(&self) -> Result<(), DeliveryError> {
        self.notifier.send_test().await
    }

    /// One full pass over the configured feeds. Per-feed, per-entry and
    /// delivery failures are logged and absorbed; the state is saved at the
    /// end whether or not anything was new.
    pub async fn run_cycle(&mut self) -> CycleReport {
        tracing::info!(parent: &self.span, feeds = self.settings.feeds.len(), "checking for new missions");
        let mut report = CycleReport::default();
        let mut batch: Vec<Item> = Vec::new();

        for (i, feed) in self.settings.feeds.iter().enumerate() {
            set_phase(&mut self.phase, &self.span, Phase::Fetching(i));
            let raw = match self.source.fetch(feed).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(parent: &self.span, feed = %feed.name, error = %e, "feed skipped this cycle");
                    counter!("monitor_feed_errors_total").increment(1);
                    report.feeds_failed.push(feed.name.clone());
                    continue;
                }
            };

            set_phase(&mut self.phase, &self.span, Phase::Extracting);
            let mut items = Vec::with_capacity(raw.len());
            for entry in raw {
                let hint = entry
                    .guid
                    .clone()
                    .or_else(|| entry.link.clone())
                    .unwrap_or_default();
                match assemble_item(entry, feed) {
                    Ok(item) => items.push(item),
                    Err(e) => {
                        tracing::warn!(parent: &self.span, feed = %feed.name, entry = %hint, error = %e, "entry skipped");
                        report.skipped_entries += 1;
                    }
                }
            }

            set_phase(&mut self.phase, &self.span, Phase::Deduplicating);
            let mut fresh = self.store.filter_new(items);
            let mut in_feed = HashSet::new();
            fresh.retain(|it| in_feed.insert(it.id.clone()));

            let cap = self.settings.max_items_per_check;
            if fresh.len() > cap {
                let dropped = fresh.len() - cap;
                tracing::warn!(
                    parent: &self.span,
                    feed = %feed.name,
                    found = fresh.len(),
                    kept = cap,
                    dropped,
                    "per-check cap reached; the rest stays unseen for a later cycle"
                );
                fresh.truncate(cap);
                report.dropped += dropped;
            }

            for it in &fresh {
                self.store.mark_seen(it);
            }
            report.feeds_processed.push(feed.name.clone());
            batch.extend(fresh);
        }

        report.new_items = batch.len();

        set_phase(&mut self.phase, &self.span, Phase::Notifying);
        if batch.is_empty() {
            tracing::info!(parent: &self.span, "no new missions");
        } else {
            tracing::info!(parent: &self.span, count = batch.len(), "sending notifications");
            report.delivered = self.notifier.send_batch(&batch).await;
            if report.delivered == batch.len() {
                tracing::info!(parent: &self.span, "all notifications sent");
            } else {
                tracing::warn!(
                    parent: &self.span,
                    delivered = report.delivered,
                    total = batch.len(),
                    "some notifications were not delivered"
                );
            }
            if self.settings.send_summary {
                // failure already logged by the notifier
                let _ = self.notifier.send_summary(&report.summary()).await;
            }
        }

        set_phase(&mut self.phase, &self.span, Phase::Persisting);
        match self.store.persist() {
            Ok(()) => report.persisted = true,
            Err(e) => {
                tracing::error!(parent: &self.span, error = %e, "state not saved; keeping it in memory for the next cycle");
                counter!("monitor_persist_errors_total").increment(1);
            }
        }

        counter!("monitor_cycles_total").increment(1);
        counter!("monitor_new_items_total").increment(report.new_items as u64);
        counter!("monitor_delivered_items_total").increment(report.delivered as u64);
        counter!("monitor_entries_skipped_total").increment(report.skipped_entries as u64);
        counter!("monitor_items_dropped_total").increment(report.dropped as u64);
        gauge!("monitor_last_cycle_ts").set(chrono::Utc::now().timestamp() as f64);

        set_phase(&mut self.phase, &self.span, Phase::Idle);
        tracing::info!(parent: &self.span, new = report.new_items, "check finished");
        report
    }

    /// Run a cycle now and then every `every` until `shutdown` resolves. A
    /// cycle interrupted by shutdown is abandoned; the state file keeps its
    /// last complete snapshot.
    pub async fn run_forever<F>(&mut self, every: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(parent: &self.span, every_secs = every.as_secs(), "monitor started");
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.run_cycle() => {}
                        _ = &mut shutdown => {
                            tracing::warn!(parent: &self.span, "interrupted during a cycle");
                            break;
                        }
                    }
                }
            }
        }
        set_phase(&mut self.phase, &self.span, Phase::Idle);
        tracing::info!(parent: &self.span, "monitor stopped");
    }
}
