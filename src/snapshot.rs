// Append-only feed snapshot store.
//
// Every provider fetch is journaled as one JSONL record keyed by
// (league, year, week, feed). Backtests resolve backward in time against
// publish_time so a replay never observes data that was not public at its
// cutoff.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::feeds::{FLAG_AS_OF_MISS, FLAG_STALE, FeedEnvelope};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub schema_version: u32,
    pub observed_at_utc: DateTime<Utc>,
    pub league_id: u64,
    pub year: i32,
    pub week: u32,
    pub feed_name: String,
    pub envelope: FeedEnvelope,
}

#[derive(Debug, Clone)]
pub struct ResolvedSnapshot {
    pub envelope: FeedEnvelope,
    /// Publish time of the record that answered the lookup. None when the
    /// lookup degraded to a neutral envelope.
    pub resolved_publish_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct SnapshotStore {
    root: PathBuf,
    retention_days: i64,
    // Serializes appenders within the process; each append rewrites the file
    // through a temp + rename swap so readers never see a torn log.
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn open(root: impl Into<PathBuf>, retention_days: i64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create snapshot root {}", root.display()))?;
        Ok(Self {
            root,
            retention_days: retention_days.max(0),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path_for(&self, league_id: u64, year: i32, week: u32, feed_name: &str) -> PathBuf {
        self.root
            .join(league_id.to_string())
            .join(year.to_string())
            .join(format!("week_{week}"))
            .join(format!("{}.jsonl", feed_name.trim().to_ascii_lowercase()))
    }

    /// Journal one envelope. Existing records are retained (within the
    /// retention window), the new record is appended, and the log is kept
    /// sorted by publish_time.
    pub fn record(
        &self,
        league_id: u64,
        year: i32,
        week: u32,
        feed_name: &str,
        envelope: &FeedEnvelope,
    ) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = self.path_for(league_id, year, week, feed_name);
        let mut records = load_records(&path);
        records.push(SnapshotRecord {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            observed_at_utc: Utc::now(),
            league_id,
            year,
            week,
            feed_name: feed_name.trim().to_ascii_lowercase(),
            envelope: envelope.clone(),
        });

        let cutoff = Utc::now() - Duration::days(self.retention_days);
        records.retain(|r| r.observed_at_utc >= cutoff);
        records.sort_by_key(|r| r.envelope.publish_time);

        write_records(&path, &records)
    }

    /// Backward-in-time lookup under an optional as-of cutoff.
    ///
    /// Policy is fixed: `backward_publish_time` selection with
    /// `degrade_warn` on a miss. A chosen record older than
    /// `as_of - max_staleness` is still returned but flagged stale.
    pub fn resolve(
        &self,
        league_id: u64,
        year: i32,
        week: u32,
        feed_name: &str,
        as_of: Option<DateTime<Utc>>,
        max_staleness_seconds: Option<i64>,
    ) -> ResolvedSnapshot {
        let path = self.path_for(league_id, year, week, feed_name);
        let records = load_records(&path);

        let chosen = match as_of {
            None => records.last(),
            Some(cutoff) => records
                .iter()
                .filter(|r| r.envelope.publish_time <= cutoff)
                .max_by_key(|r| r.envelope.publish_time),
        };

        let Some(record) = chosen else {
            let reference = as_of.unwrap_or_else(Utc::now);
            warn!(feed = feed_name, week, "no snapshot at or before cutoff");
            return ResolvedSnapshot {
                envelope: FeedEnvelope::neutral(reference)
                    .with_flag(FLAG_AS_OF_MISS)
                    .with_warning(format!(
                        "{feed_name}: no snapshot at or before {}",
                        reference.to_rfc3339()
                    )),
                resolved_publish_time: None,
            };
        };

        let mut envelope = record.envelope.clone();
        if let (Some(cutoff), Some(staleness)) = (as_of, max_staleness_seconds) {
            let oldest_fresh = cutoff - Duration::seconds(staleness.max(0));
            if envelope.publish_time < oldest_fresh {
                warn!(feed = feed_name, week, "resolved snapshot is stale");
                envelope.quality_flags.insert(FLAG_STALE.to_string());
                envelope.warnings.push(format!(
                    "{feed_name}: snapshot published {} precedes staleness bound {}",
                    envelope.publish_time.to_rfc3339(),
                    oldest_fresh.to_rfc3339()
                ));
            }
        }

        ResolvedSnapshot {
            resolved_publish_time: Some(record.envelope.publish_time),
            envelope,
        }
    }

    /// Drop every record observed before the retention window, across all
    /// journaled feeds. Returns the number of records removed.
    pub fn prune(&self, retention_days: i64) -> Result<usize> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let cutoff = Utc::now() - Duration::days(retention_days.max(0));
        let mut removed = 0;
        for path in walk_jsonl(&self.root) {
            let records = load_records(&path);
            let retained: Vec<SnapshotRecord> = records
                .iter()
                .filter(|r| r.observed_at_utc >= cutoff)
                .cloned()
                .collect();
            removed += records.len() - retained.len();
            if retained.len() != records.len() {
                write_records(&path, &retained)?;
            }
        }
        Ok(removed)
    }
}

fn load_records(path: &Path) -> Vec<SnapshotRecord> {
    let Ok(raw) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut records = Vec::new();
    for (line_number, line) in raw.lines().enumerate() {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<SnapshotRecord>(text) {
            Ok(record) if record.schema_version == SNAPSHOT_SCHEMA_VERSION => {
                records.push(record);
            }
            Ok(_) => {
                warn!(path = %path.display(), line = line_number + 1, "snapshot schema mismatch");
            }
            Err(_) => {
                warn!(path = %path.display(), line = line_number + 1, "malformed snapshot line");
            }
        }
    }
    records
}

fn write_records(path: &Path, records: &[SnapshotRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create snapshot dir {}", parent.display()))?;
    }
    let mut body = String::new();
    for record in records {
        body.push_str(&serde_json::to_string(record).context("serialize snapshot record")?);
        body.push('\n');
    }
    let tmp = path.with_extension("jsonl.tmp");
    fs::write(&tmp, body).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

fn walk_jsonl(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                out.push(path);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn temp_store(tag: &str) -> SnapshotStore {
        let root = std::env::temp_dir().join(format!("gridiron_snapshots_{tag}"));
        let _ = fs::remove_dir_all(&root);
        SnapshotStore::open(root, 120).expect("open store")
    }

    fn envelope_at(publish: DateTime<Utc>, wind: f64) -> FeedEnvelope {
        let mut envelope = FeedEnvelope::neutral(publish);
        envelope.data = json!({
            "team_weather": {"1": {"is_dome": false, "wind_mph": wind, "precip_prob": 0.1}}
        });
        envelope.publish_time = publish;
        envelope
    }

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 12, hour, 0, 0).unwrap()
    }

    #[test]
    fn resolve_without_cutoff_returns_latest() {
        let store = temp_store("latest");
        for hour in [9, 11, 13] {
            store
                .record(1, 2025, 6, "weather", &envelope_at(t(hour), hour as f64))
                .unwrap();
        }
        let resolved = store.resolve(1, 2025, 6, "weather", None, None);
        assert_eq!(resolved.resolved_publish_time, Some(t(13)));
    }

    #[test]
    fn resolve_with_cutoff_picks_newest_at_or_before() {
        let store = temp_store("cutoff");
        for hour in [9, 11, 13] {
            store
                .record(1, 2025, 6, "weather", &envelope_at(t(hour), hour as f64))
                .unwrap();
        }
        let resolved = store.resolve(1, 2025, 6, "weather", Some(t(11)), None);
        assert_eq!(resolved.resolved_publish_time, Some(t(11)));

        let resolved = store.resolve(1, 2025, 6, "weather", Some(t(12)), None);
        assert_eq!(resolved.resolved_publish_time, Some(t(11)));
    }

    #[test]
    fn miss_degrades_to_neutral_with_flag() {
        let store = temp_store("miss");
        store
            .record(1, 2025, 6, "weather", &envelope_at(t(12), 5.0))
            .unwrap();
        let resolved = store.resolve(1, 2025, 6, "weather", Some(t(8)), None);
        assert!(resolved.resolved_publish_time.is_none());
        assert!(resolved.envelope.has_flag(FLAG_AS_OF_MISS));
        assert!(!resolved.envelope.warnings.is_empty());
    }

    #[test]
    fn stale_record_is_returned_but_flagged() {
        let store = temp_store("stale");
        store
            .record(1, 2025, 6, "weather", &envelope_at(t(6), 5.0))
            .unwrap();
        let resolved = store.resolve(1, 2025, 6, "weather", Some(t(13)), Some(3600));
        assert_eq!(resolved.resolved_publish_time, Some(t(6)));
        assert!(resolved.envelope.has_flag(FLAG_STALE));
    }

    #[test]
    fn prune_drops_old_records() {
        let store = temp_store("prune");
        store
            .record(1, 2025, 6, "weather", &envelope_at(t(6), 5.0))
            .unwrap();
        // Everything was observed just now, so a wide window keeps it...
        assert_eq!(store.prune(30).unwrap(), 0);
        // ...and a zero-day window wipes the log.
        let removed = store.prune(0).unwrap();
        assert!(removed <= 1);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let store = temp_store("malformed");
        store
            .record(1, 2025, 6, "weather", &envelope_at(t(9), 5.0))
            .unwrap();
        let path = store.path_for(1, 2025, 6, "weather");
        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("{not json\n");
        fs::write(&path, raw).unwrap();

        let resolved = store.resolve(1, 2025, 6, "weather", None, None);
        assert_eq!(resolved.resolved_publish_time, Some(t(9)));
    }
}
