//! Retention Sweep Background Task
//!
//! Periodically expires pending handoffs nobody picked up and purges old
//! terminal records from every project in the ledger.
//!
//! # Configuration
//!
//! ```rust
//! use relay_agents::RetentionSweepConfig;
//! use std::time::Duration;
//!
//! let config = RetentionSweepConfig {
//!     sweep_interval: Duration::from_secs(300),
//!     pending_handoff_ttl: Duration::from_secs(86_400),
//!     retention_days: 30,
//! };
//! ```

use crate::CoordinationHub;
use chrono::Utc;
use relay_core::{
    RelayConfig, DEFAULT_PENDING_HANDOFF_TTL_SECS, DEFAULT_RETENTION_DAYS,
    DEFAULT_SWEEP_INTERVAL_SECS,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the retention sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionSweepConfig {
    /// How often a sweep runs (default: 5 minutes)
    pub sweep_interval: Duration,

    /// Pending handoffs older than this are expired (default: 24 hours)
    pub pending_handoff_ttl: Duration,

    /// Terminal records older than this many days are purged (default: 30)
    pub retention_days: u32,
}

impl Default for RetentionSweepConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            pending_handoff_ttl: Duration::from_secs(DEFAULT_PENDING_HANDOFF_TTL_SECS),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl From<&RelayConfig> for RetentionSweepConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            sweep_interval: config.sweep_interval(),
            pending_handoff_ttl: config.pending_handoff_ttl(),
            retention_days: config.retention_days,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters accumulated over the task's lifetime.
#[derive(Debug, Default)]
pub struct RetentionMetrics {
    /// Sweeps completed
    pub cycles: AtomicU64,

    /// Pending handoffs expired
    pub handoffs_expired: AtomicU64,

    /// Terminal records deleted
    pub records_purged: AtomicU64,

    /// Ledger errors encountered
    pub errors: AtomicU64,
}

impl RetentionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RetentionSnapshot {
        RetentionSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            handoffs_expired: self.handoffs_expired.load(Ordering::Relaxed),
            records_purged: self.records_purged.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RetentionMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionSnapshot {
    pub cycles: u64,
    pub handoffs_expired: u64,
    pub records_purged: u64,
    pub errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run retention sweeps on `config.sweep_interval` until shutdown.
///
/// The first sweep runs immediately. Returns the metrics collected over the
/// task's lifetime.
///
/// # Example
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let config = RetentionSweepConfig::from(hub.config());
/// let handle = tokio::spawn(retention_sweep_task(hub.clone(), config, shutdown_rx));
///
/// // Later
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn retention_sweep_task(
    hub: Arc<CoordinationHub>,
    config: RetentionSweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<RetentionMetrics> {
    let metrics = Arc::new(RetentionMetrics::new());

    let mut sweep_interval = interval(config.sweep_interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        sweep_interval_secs = config.sweep_interval.as_secs(),
        pending_handoff_ttl_secs = config.pending_handoff_ttl.as_secs(),
        retention_days = config.retention_days,
        "Retention sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Retention sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                run_sweep_once(&hub, &config, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        handoffs_expired = snapshot.handoffs_expired,
        records_purged = snapshot.records_purged,
        errors = snapshot.errors,
        "Retention sweep task completed"
    );

    metrics
}

/// Perform one sweep: expire stale pending handoffs, then purge each project.
///
/// Errors are counted and logged; one failing project does not stop the rest.
pub fn run_sweep_once(hub: &CoordinationHub, config: &RetentionSweepConfig, metrics: &RetentionMetrics) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);

    let threshold = chrono::Duration::from_std(config.pending_handoff_ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_sub_signed(ttl));
    let expired = match threshold {
        Some(threshold) => match hub.expire_stale_handoffs(threshold) {
            Ok(count) => count as u64,
            Err(e) => {
                tracing::error!(error = %e, "Failed to expire stale handoffs");
                metrics.errors.fetch_add(1, Ordering::Relaxed);
                0
            }
        },
        None => 0,
    };
    metrics.handoffs_expired.fetch_add(expired, Ordering::Relaxed);

    let projects = match hub.project_ids() {
        Ok(projects) => projects,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list projects for retention");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let mut purged = 0u64;
    for project_id in projects {
        match hub.clear_old_data(&project_id, config.retention_days) {
            Ok(report) => purged += report.total() as u64,
            Err(e) => {
                tracing::error!(error = %e, %project_id, "Failed to purge project");
                metrics.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    metrics.records_purged.fetch_add(purged, Ordering::Relaxed);

    if expired > 0 || purged > 0 {
        tracing::info!(expired, purged, "Retention sweep cycle completed");
    } else {
        tracing::trace!("Retention sweep cycle completed with nothing to do");
    }
}
