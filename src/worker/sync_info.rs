//! Sync info tracker - persists last run times to disk
//!
//! Keeps the worker from re-running every job right after a restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::models::SyncKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncInfo {
    /// Last successful run per job ("items", "prices", ...)
    #[serde(default)]
    pub last_sync: BTreeMap<String, DateTime<Utc>>,

    /// Total iteration count
    #[serde(default)]
    pub iteration_count: u64,
}

impl SyncInfo {
    /// Load sync info from file, or start fresh if missing or unreadable
    pub fn load(info_path: &Path) -> Self {
        match fs::read_to_string(info_path) {
            Ok(content) => match serde_json::from_str::<SyncInfo>(&content) {
                Ok(info) => {
                    debug!("Loaded sync info from {}", info_path.display());
                    info
                }
                Err(e) => {
                    warn!(
                        "Failed to parse sync info from {}: {}. Using defaults.",
                        info_path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                debug!("No existing sync info at {}, using defaults", info_path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, info_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = info_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(info_path, content)?;
        debug!("Saved sync info to {}", info_path.display());
        Ok(())
    }

    pub fn last_sync(&self, kind: SyncKind) -> Option<DateTime<Utc>> {
        self.last_sync.get(kind.as_str()).copied()
    }

    /// Check if enough time has elapsed since the job last ran
    pub fn should_sync(&self, kind: SyncKind, interval_secs: u64) -> bool {
        self.should_sync_at(kind, interval_secs, Utc::now())
    }

    fn should_sync_at(&self, kind: SyncKind, interval_secs: u64, now: DateTime<Utc>) -> bool {
        match self.last_sync(kind) {
            None => true,
            Some(last) => {
                let elapsed_secs = now.signed_duration_since(last).num_seconds();
                let due = elapsed_secs >= interval_secs as i64;
                if !due {
                    debug!(
                        job = kind.as_str(),
                        "Elapsed {}s < {}s, skipping (wait {}s more)",
                        elapsed_secs,
                        interval_secs,
                        interval_secs as i64 - elapsed_secs
                    );
                }
                due
            }
        }
    }

    pub fn mark_synced(&mut self, kind: SyncKind) {
        self.last_sync.insert(kind.as_str().to_string(), Utc::now());
    }
}
