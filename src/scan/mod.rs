//! Scan status tracking for full-inventory passes.
//!
//! The tracker is one mutex-guarded cell moving through
//! `Idle -> Scanning -> Idle` on success or `Scanning -> Failed -> Idle` on
//! error. Beginning a scan is a compare-and-set under the mutex, which is
//! what enforces the one-scan-at-a-time invariant under concurrent callers.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

mod error;

pub use error::ScanInProgress;

/// How long a failed scan stays visible before the tracker returns to idle
/// on its own. A failure is also cleared the first time it is read.
const FAILED_RESET_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Scanning,
    Failed,
}

#[derive(Debug)]
struct Cell {
    state: State,
    started: Option<Instant>,
    failed_at: Option<Instant>,
    failed_operation: Option<&'static str>,
    last_scan_time: Option<i64>,
    last_duration_ms: Option<u64>,
}

/// Point-in-time view of the tracker, embedded in the dashboard summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ScanStatusSnapshot {
    pub is_scanning: bool,
    pub failed: bool,
    /// Name of the operation that failed the scan. The engine-specific
    /// message stays on the error chain; rendering it is the caller's
    /// concern.
    pub failed_operation: Option<&'static str>,
    pub last_scan_time: Option<i64>,
    pub scan_duration_ms: Option<u64>,
}

/// Records whether a full-inventory pass is in progress, when the last one
/// completed and how long it took.
#[derive(Debug)]
pub struct ScanTracker {
    cell: Mutex<Cell>,
}

impl Default for ScanTracker {
    fn default() -> Self {
        Self {
            cell: Mutex::new(Cell {
                state: State::Idle,
                started: None,
                failed_at: None,
                failed_operation: None,
                last_scan_time: None,
                last_duration_ms: None,
            }),
        }
    }
}

impl ScanTracker {
    /// Transitions `Idle`/`Failed` into `Scanning`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanInProgress`] when a scan is already running; the
    /// running scan's state is left untouched.
    pub fn begin(&self) -> Result<ScanGuard<'_>, ScanInProgress> {
        let mut cell = self.cell.lock().expect("scan cell poisoned");
        if cell.state == State::Scanning {
            return Err(ScanInProgress);
        }
        cell.state = State::Scanning;
        cell.started = Some(Instant::now());
        cell.failed_at = None;
        cell.failed_operation = None;
        Ok(ScanGuard {
            tracker: self,
            armed: true,
        })
    }

    /// Current tracker state.
    ///
    /// Reading a `Failed` state surfaces the failure once and resets the
    /// tracker to `Idle`; a failure nobody reads expires after
    /// [`FAILED_RESET_INTERVAL`].
    pub fn status(&self) -> ScanStatusSnapshot {
        let mut cell = self.cell.lock().expect("scan cell poisoned");
        if cell.state == State::Failed {
            let expired = cell
                .failed_at
                .is_none_or(|at| at.elapsed() >= FAILED_RESET_INTERVAL);
            let snapshot = ScanStatusSnapshot {
                is_scanning: false,
                failed: !expired,
                failed_operation: if expired { None } else { cell.failed_operation },
                last_scan_time: cell.last_scan_time,
                scan_duration_ms: cell.last_duration_ms,
            };
            cell.state = State::Idle;
            cell.failed_at = None;
            cell.failed_operation = None;
            return snapshot;
        }
        ScanStatusSnapshot {
            is_scanning: cell.state == State::Scanning,
            failed: false,
            failed_operation: None,
            last_scan_time: cell.last_scan_time,
            scan_duration_ms: cell.last_duration_ms,
        }
    }
}

/// Live handle for the one tracked scan. Exactly one exists at a time.
#[derive(Debug)]
pub struct ScanGuard<'a> {
    tracker: &'a ScanTracker,
    armed: bool,
}

impl ScanGuard<'_> {
    /// Records a successful completion with its elapsed duration.
    pub fn complete(mut self) {
        self.armed = false;
        let mut cell = self.tracker.cell.lock().expect("scan cell poisoned");
        let elapsed = cell.started.take().map(|started| started.elapsed());
        cell.state = State::Idle;
        cell.last_scan_time = Some(epoch_now());
        cell.last_duration_ms = elapsed.map(|elapsed| elapsed.as_millis() as u64);
    }

    /// Records a failed scan, keeping only the failing operation's name.
    pub fn fail(mut self, operation: &'static str) {
        self.armed = false;
        let mut cell = self.tracker.cell.lock().expect("scan cell poisoned");
        cell.state = State::Failed;
        cell.started = None;
        cell.failed_at = Some(Instant::now());
        cell.failed_operation = Some(operation);
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // the owning future was dropped mid-poll: the pass produced
        // nothing, so the tracker returns to idle without a completion
        let mut cell = self.tracker.cell.lock().expect("scan cell poisoned");
        cell.state = State::Idle;
        cell.started = None;
        log::warn!("inventory scan abandoned before completion");
    }
}

fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_lifecycle_records_completion() {
        let tracker = ScanTracker::default();
        assert!(!tracker.status().is_scanning);

        let guard = tracker.begin().unwrap();
        assert!(tracker.status().is_scanning);
        guard.complete();

        let status = tracker.status();
        assert!(!status.is_scanning);
        assert!(!status.failed);
        assert!(status.last_scan_time.is_some());
        assert!(status.scan_duration_ms.is_some());
    }

    #[test]
    fn test_concurrent_scan_rejected_and_state_unchanged() {
        let tracker = ScanTracker::default();
        let guard = tracker.begin().unwrap();

        assert_eq!(tracker.begin().unwrap_err(), ScanInProgress);
        assert!(tracker.status().is_scanning);

        guard.complete();
        assert!(tracker.begin().is_ok());
    }

    #[test]
    fn test_failed_scan_read_once_resets_to_idle() {
        let tracker = ScanTracker::default();
        tracker.begin().unwrap().fail("list_containers");

        let status = tracker.status();
        assert!(status.failed);
        assert_eq!(status.failed_operation, Some("list_containers"));

        let status = tracker.status();
        assert!(!status.failed);
        assert_eq!(status.failed_operation, None);
    }

    #[test]
    fn test_failed_scan_can_start_again() {
        let tracker = ScanTracker::default();
        tracker.begin().unwrap().fail("disk_usage");
        assert!(tracker.begin().is_ok());
    }

    #[test]
    fn test_dropped_guard_returns_to_idle_without_completion() {
        let tracker = ScanTracker::default();
        drop(tracker.begin().unwrap());

        let status = tracker.status();
        assert!(!status.is_scanning);
        assert!(!status.failed);
        assert_eq!(status.last_scan_time, None);
    }
}
