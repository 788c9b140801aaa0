// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration, mirroring `coopmux::config::MuxConfig`'s
//! `clap::Args`-derived, env-overridable style.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, clap::Args)]
pub struct HubConfig {
    /// Path to the JSON file holding the full message list (§4.2).
    #[arg(long, default_value = "hub-data/messages.json", env = "HUB_STORAGE_PATH")]
    pub storage_path: PathBuf,

    /// Root directory for the per-ref archive logs (§4.3).
    #[arg(long, default_value = "hub-data/archive", env = "HUB_ARCHIVE_DIR")]
    pub archive_dir: PathBuf,

    /// `_initiateNotifications` polling interval, in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "HUB_NOTIFIER_POLL_MS")]
    pub notifier_poll_ms: u64,

    /// `_pruneOldMessages` polling interval, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "HUB_PRUNE_INTERVAL_MS")]
    pub prune_interval_ms: u64,

    /// `_deleteClosedMessages` polling interval, in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "HUB_CLOSED_CLEANUP_INTERVAL_MS")]
    pub closed_cleanup_interval_ms: u64,

    /// How long a `closed` message lingers before being soft-deleted.
    #[arg(long, default_value_t = 30_000, env = "HUB_CLOSED_GRACE_MS")]
    pub closed_grace_ms: u64,

    /// `_hardDeleteMessages` polling interval, in milliseconds.
    #[arg(long, default_value_t = 4 * 3_600_000, env = "HUB_HARD_DELETE_INTERVAL_MS")]
    pub hard_delete_interval_ms: u64,

    /// Grace period after startup before the first hard-delete pass runs.
    #[arg(long, default_value_t = 60_000, env = "HUB_HARD_DELETE_STARTUP_GRACE_MS")]
    pub hard_delete_startup_grace_ms: u64,

    /// Retention window a quasi-deleted message must age past before it is
    /// physically removed.
    #[arg(long, default_value_t = 7 * 24 * 3_600_000, env = "HUB_HARD_DELETE_RETENTION_MS")]
    pub hard_delete_retention_ms: u64,

    /// Max messages physically removed per hard-delete pass.
    #[arg(long, default_value_t = 50, env = "HUB_HARD_DELETE_BATCH_SIZE")]
    pub hard_delete_batch_size: usize,

    #[command(flatten)]
    pub quiet_hours: QuietHoursConfig,
}

impl HubConfig {
    pub fn notifier_poll_interval(&self) -> Duration {
        Duration::from_millis(self.notifier_poll_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }

    pub fn closed_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.closed_cleanup_interval_ms)
    }

    pub fn hard_delete_interval(&self) -> Duration {
        Duration::from_millis(self.hard_delete_interval_ms)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("hub-data/messages.json"),
            archive_dir: PathBuf::from("hub-data/archive"),
            notifier_poll_ms: 10_000,
            prune_interval_ms: 30_000,
            closed_cleanup_interval_ms: 10_000,
            closed_grace_ms: 30_000,
            hard_delete_interval_ms: 4 * 3_600_000,
            hard_delete_startup_grace_ms: 60_000,
            hard_delete_retention_ms: 7 * 24 * 3_600_000,
            hard_delete_batch_size: 50,
            quiet_hours: QuietHoursConfig::default(),
        }
    }
}

/// Quiet-hours policy (§4.5). `start_min`/`end_min` are minute-of-day and
/// may wrap across midnight (`start_min > end_min`).
#[derive(Debug, Clone, clap::Args)]
pub struct QuietHoursConfig {
    #[arg(long, default_value_t = false, env = "HUB_QUIET_HOURS_ENABLED")]
    pub enabled: bool,

    #[arg(long, default_value_t = 22 * 60, env = "HUB_QUIET_HOURS_START_MIN")]
    pub start_min: u32,

    #[arg(long, default_value_t = 6 * 60, env = "HUB_QUIET_HOURS_END_MIN")]
    pub end_min: u32,

    /// Repeat `due` events are suppressed only at or below this level.
    #[arg(long, default_value_t = 20, env = "HUB_QUIET_HOURS_MAX_LEVEL")]
    pub max_level: i32,

    /// Uniform random spread added to the rescheduled `notifyAt`.
    #[arg(long, default_value_t = 0, env = "HUB_QUIET_HOURS_SPREAD_MS")]
    pub spread_ms: u64,
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self { enabled: false, start_min: 22 * 60, end_min: 6 * 60, max_level: 20, spread_ms: 0 }
    }
}
