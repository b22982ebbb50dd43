// src/store.rs
//! Seen-mission store: which item ids were already notified, with enough
//! metadata to age them out and report statistics.
//!
//! The on-disk snapshot carries both the id list and the record map. In
//! memory the record map is the only collection and the id set is its key
//! set, so the two cannot drift apart. A file where they disagree is
//! reconciled on load.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::error::PersistenceError;
use crate::ingest::types::Item;

pub const DEFAULT_RETENTION_DAYS: i64 = 30;
const UNKNOWN_FEED: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeenRecord {
    pub title: String,
    pub pub_date: String,
    pub feed_name: String,
    /// ISO-8601, local clock when the item was marked.
    pub seen_at: String,
}

/// The state file. Files written by the earlier bot use `seen_missions` /
/// `missions_data` and load unchanged; an object without an id list is
/// rejected rather than read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(alias = "seen_missions")]
    pub seen_ids: Vec<String>,
    #[serde(default, alias = "missions_data")]
    pub records: BTreeMap<String, SeenRecord>,
    #[serde(default)]
    pub last_update: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_seen: usize,
    pub counts_by_feed: BTreeMap<String, usize>,
    pub oldest_title: Option<String>,
    pub newest_title: Option<String>,
}

/// Parse a stored `seen_at`. Accepts RFC 3339 and naive ISO-8601 local
/// timestamps; anything else is `None`.
pub fn parse_seen_at(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug)]
pub struct SeenStore {
    path: PathBuf,
    records: BTreeMap<String, SeenRecord>,
    retention_days: i64,
    span: Span,
}

impl SeenStore {
    /// Empty store backed by `path`; nothing is read.
    pub fn new(path: impl Into<PathBuf>, span: Span) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            retention_days: DEFAULT_RETENTION_DAYS,
            span,
        }
    }

    /// Load the snapshot at `path`. A missing file is a fresh start; an
    /// unreadable one is logged and also yields an empty store.
    pub fn load(path: impl Into<PathBuf>, span: Span) -> Self {
        let mut store = Self::new(path, span);

        match fs::read_to_string(&store.path) {
            Ok(s) => match serde_json::from_str::<StateSnapshot>(&s) {
                Ok(snap) => {
                    store.records = store.reconcile(snap, Local::now());
                    tracing::info!(
                        parent: &store.span,
                        path = %store.path.display(),
                        seen = store.records.len(),
                        "state loaded"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        parent: &store.span,
                        path = %store.path.display(),
                        error = %e,
                        "state file unreadable, starting empty"
                    );
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    parent: &store.span,
                    path = %store.path.display(),
                    "no state file, starting empty"
                );
            }
            Err(e) => {
                tracing::error!(
                    parent: &store.span,
                    path = %store.path.display(),
                    error = %e,
                    "state file could not be read, starting empty"
                );
            }
        }
        store
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    fn reconcile(
        &self,
        snap: StateSnapshot,
        now: DateTime<Local>,
    ) -> BTreeMap<String, SeenRecord> {
        let mut records = snap.records;
        let mut repaired = 0usize;
        for id in snap.seen_ids {
            records.entry(id).or_insert_with(|| {
                repaired += 1;
                SeenRecord {
                    feed_name: UNKNOWN_FEED.to_string(),
                    seen_at: now.to_rfc3339(),
                    ..Default::default()
                }
            });
        }
        if repaired > 0 {
            tracing::warn!(
                parent: &self.span,
                repaired,
                "seen ids without records; placeholders added"
            );
        }
        records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn record(&self, id: &str) -> Option<&SeenRecord> {
        self.records.get(id)
    }

    pub fn seen_ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn mark_seen(&mut self, item: &Item) {
        self.mark_seen_at(item, Local::now());
    }

    /// [`SeenStore::mark_seen`] with an explicit clock. Re-marking refreshes
    /// `seen_at`.
    pub fn mark_seen_at(&mut self, item: &Item, now: DateTime<Local>) {
        self.records.insert(
            item.id.clone(),
            SeenRecord {
                title: item.title.clone(),
                pub_date: item.pub_date.clone(),
                feed_name: item.feed_name.clone(),
                seen_at: now.to_rfc3339(),
            },
        );
        tracing::debug!(parent: &self.span, id = %item.id, title = %item.title, "marked seen");
    }

    pub fn mark_all_seen(&mut self, items: &[Item]) {
        let now = Local::now();
        for it in items {
            self.mark_seen_at(it, now);
        }
    }

    /// Items whose id is not yet seen, in input order.
    pub fn filter_new(&self, items: Vec<Item>) -> Vec<Item> {
        let total = items.len();
        let fresh: Vec<Item> = items
            .into_iter()
            .filter(|it| !self.is_seen(&it.id))
            .collect();
        tracing::info!(parent: &self.span, new = fresh.len(), total, "filtered new items");
        fresh
    }

    /// Drop records older than `retention_days`. Returns how many went.
    pub fn prune(&mut self, retention_days: i64) -> usize {
        self.prune_at(Local::now(), retention_days)
    }

    /// Records strictly older than `now - retention_days` are removed;
    /// records whose `seen_at` does not parse are kept.
    /// A window reaching past the calendar range keeps everything.
    pub fn prune_at(&mut self, now: DateTime<Local>, retention_days: i64) -> usize {
        let Some(cutoff) = Duration::try_days(retention_days)
            .and_then(|window| now.checked_sub_signed(window))
            .map(|dt| dt.with_timezone(&Utc))
        else {
            return 0;
        };
        let before = self.records.len();
        self.records
            .retain(|_, rec| parse_seen_at(&rec.seen_at).map_or(true, |ts| ts >= cutoff));

        let removed = before - self.records.len();
        if removed > 0 {
            tracing::info!(parent: &self.span, removed, retention_days, "pruned old missions");
        }
        removed
    }

    /// Prune, then materialize the persisted form.
    pub fn snapshot(&mut self) -> StateSnapshot {
        self.snapshot_at(Local::now())
    }

    fn snapshot_at(&mut self, now: DateTime<Local>) -> StateSnapshot {
        self.prune_at(now, self.retention_days);
        StateSnapshot {
            seen_ids: self.records.keys().cloned().collect(),
            records: self.records.clone(),
            last_update: now.to_rfc3339(),
        }
    }

    /// Write the snapshot to the backing file. The previous file is replaced
    /// only by a complete new one; on failure it is left as it was.
    pub fn persist(&mut self) -> Result<(), PersistenceError> {
        let snap = self.snapshot();
        let json = serde_json::to_string_pretty(&snap)?;
        match write_atomic(&self.path, json.as_bytes()) {
            Ok(()) => {
                tracing::debug!(
                    parent: &self.span,
                    path = %self.path.display(),
                    seen = snap.seen_ids.len(),
                    "state saved"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(parent: &self.span, error = %e, "state save failed");
                Err(e)
            }
        }
    }

    /// Forget everything and delete the backing file. Deleting a file that
    /// is already gone is not an error.
    pub fn reset(&mut self) -> Result<(), PersistenceError> {
        self.records.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(parent: &self.span, error = %e, "state reset failed");
                return Err(PersistenceError::io(&self.path, e));
            }
        }
        tracing::info!(parent: &self.span, path = %self.path.display(), "state reset");
        Ok(())
    }

    pub fn statistics(&self) -> Statistics {
        let mut counts_by_feed = BTreeMap::new();
        for rec in self.records.values() {
            let feed = if rec.feed_name.is_empty() {
                UNKNOWN_FEED
            } else {
                rec.feed_name.as_str()
            };
            *counts_by_feed.entry(feed.to_string()).or_insert(0) += 1;
        }

        let seen_key = |rec: &&SeenRecord| parse_seen_at(&rec.seen_at).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let oldest = self.records.values().min_by_key(seen_key);
        let newest = self.records.values().max_by_key(seen_key);

        Statistics {
            total_seen: self.records.len(),
            counts_by_feed,
            oldest_title: oldest.map(|r| r.title.clone()),
            newest_title: newest.map(|r| r.title.clone()),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` next to `path`, then rename over it. The temp file is
/// removed on any failure.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;
    }

    let tmp = tmp_path(path);
    let written = (|| -> std::io::Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            if cleanup.kind() != ErrorKind::NotFound {
                tracing::warn!(tmp = %tmp.display(), error = %cleanup, "temp state file left behind");
            }
        }
        return Err(PersistenceError::io(path, e));
    }
    Ok(())
}
