//! Sync lifecycle state per source

use crate::error::{ContactError, Result};
use crate::persistence::{sync_stats_key, KeyValueStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle of one source.
///
/// ```text
/// Unconfigured --access granted--> Idle --bulk pass--> Syncing --done--> Idle
///                                  Idle --auto-sync off--> Disabled --on--> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    Unconfigured,
    Idle,
    Syncing,
    Disabled,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Unconfigured => "unconfigured",
            SyncPhase::Idle => "idle",
            SyncPhase::Syncing => "syncing",
            SyncPhase::Disabled => "disabled",
        }
    }

    /// Enter `Syncing`. A second bulk pass against the same source is refused.
    pub fn begin_bulk(&mut self, source_id: &str) -> Result<SyncPhase> {
        match *self {
            SyncPhase::Syncing => Err(ContactError::AlreadyInProgress(source_id.to_string())),
            SyncPhase::Unconfigured => Err(ContactError::PermissionDenied(source_id.to_string())),
            previous => {
                *self = SyncPhase::Syncing;
                Ok(previous)
            }
        }
    }

    /// Leave `Syncing`, landing on `Disabled` when auto-sync was switched off meanwhile
    pub fn end_bulk(&mut self, auto_sync: bool) {
        if *self == SyncPhase::Syncing {
            *self = if auto_sync {
                SyncPhase::Idle
            } else {
                SyncPhase::Disabled
            };
        }
    }

    pub fn access_granted(&mut self, auto_sync: bool) {
        if *self == SyncPhase::Unconfigured {
            *self = if auto_sync {
                SyncPhase::Idle
            } else {
                SyncPhase::Disabled
            };
        }
    }

    pub fn access_revoked(&mut self) {
        if *self != SyncPhase::Syncing {
            *self = SyncPhase::Unconfigured;
        }
    }

    /// Apply an auto-sync toggle; `Syncing` picks it up in `end_bulk`
    pub fn set_auto_sync(&mut self, auto_sync: bool) {
        match (*self, auto_sync) {
            (SyncPhase::Idle, false) => *self = SyncPhase::Disabled,
            (SyncPhase::Disabled, true) => *self = SyncPhase::Idle,
            _ => {}
        }
    }
}

/// Cumulative counters, persisted per source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncStats {
    pub fn record(&mut self, result: &SyncResult, at: DateTime<Utc>) {
        self.total += result.total as u64;
        self.succeeded += result.succeeded as u64;
        self.failed += result.failed as u64;
        self.last_synced_at = Some(at);
    }

    pub fn load(kv: &dyn KeyValueStore, source_id: &str) -> anyhow::Result<Self> {
        match kv.load(&sync_stats_key(source_id))? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing sync stats for {}", source_id)),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, kv: &dyn KeyValueStore, source_id: &str) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(self).context("serializing sync stats")?;
        kv.save(&sync_stats_key(source_id), &bytes)
    }
}

/// Point-in-time view of one source for display
#[derive(Debug, Clone)]
pub struct SyncState {
    pub source_id: String,
    pub phase: SyncPhase,
    pub permission_granted: bool,
    pub stats: SyncStats,
}

/// Outcome of one bulk pass
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub success: bool,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub errors: Vec<String>,
    /// Sync is switched off for this source; nothing was attempted
    pub skipped: bool,
}

impl SyncResult {
    pub fn skipped() -> Self {
        Self {
            success: true,
            skipped: true,
            ..Default::default()
        }
    }

    pub fn summary(&self) -> String {
        if self.skipped {
            return "skipped (sync disabled)".to_string();
        }
        format!(
            "{} of {} succeeded, {} failed in {:.1}s",
            self.succeeded,
            self.total,
            self.failed,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn second_bulk_pass_is_refused() {
        let mut phase = SyncPhase::Idle;
        assert_eq!(phase.begin_bulk("cloud").unwrap(), SyncPhase::Idle);
        let err = phase.begin_bulk("cloud").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInProgress);
        phase.end_bulk(true);
        assert_eq!(phase, SyncPhase::Idle);
    }

    #[test]
    fn unconfigured_needs_access_first() {
        let mut phase = SyncPhase::Unconfigured;
        assert_eq!(
            phase.begin_bulk("device").unwrap_err().kind(),
            ErrorKind::PermissionDenied
        );
        phase.access_granted(true);
        assert_eq!(phase, SyncPhase::Idle);
    }

    #[test]
    fn disabling_during_pass_lands_on_disabled() {
        let mut phase = SyncPhase::Idle;
        phase.begin_bulk("cloud").unwrap();
        phase.set_auto_sync(false);
        assert_eq!(phase, SyncPhase::Syncing);
        phase.end_bulk(false);
        assert_eq!(phase, SyncPhase::Disabled);
        phase.set_auto_sync(true);
        assert_eq!(phase, SyncPhase::Idle);
    }
}
