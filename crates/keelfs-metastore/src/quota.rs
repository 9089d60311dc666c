//! Write-admission quota accounting.
//!
//! One logical live-bytes figure, maintained atomically, is compared
//! against both configured ceilings before a write is admitted. Writers
//! reserve their gross incoming bytes up front, so concurrent admissions
//! can never jointly overshoot a ceiling, then settle the reservation down
//! to the actual net change once the batch has landed.

use keelfs_common::{Error, QuotaKind, Result};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub(crate) struct QuotaTracker {
    max_memory: u64,
    max_disk: u64,
    used: AtomicU64,
}

impl QuotaTracker {
    pub fn new(max_memory: u64, max_disk: u64, used: u64) -> Self {
        Self {
            max_memory,
            max_disk,
            used: AtomicU64::new(used),
        }
    }

    /// Admit and account `incoming` gross bytes, or reject with the quota
    /// that would be exceeded.
    pub fn reserve(&self, incoming: u64) -> Result<()> {
        let admitted = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                let next = used.checked_add(incoming)?;
                if next > self.max_memory || next > self.max_disk {
                    None
                } else {
                    Some(next)
                }
            });
        match admitted {
            Ok(_) => Ok(()),
            Err(used) => {
                let kind = if used.saturating_add(incoming) > self.max_memory {
                    QuotaKind::Memory
                } else {
                    QuotaKind::Disk
                };
                let limit = match kind {
                    QuotaKind::Memory => self.max_memory,
                    QuotaKind::Disk => self.max_disk,
                };
                Err(Error::QuotaExceeded {
                    kind,
                    used,
                    incoming,
                    limit,
                })
            }
        }
    }

    /// Shrink a reservation to the batch's actual net growth. `net` can be
    /// negative (overwrites shrinking a value, deletes inside a batch) but
    /// never exceeds the gross reservation.
    pub fn settle(&self, reserved: u64, net: i64) {
        let give_back = if net >= 0 {
            reserved.saturating_sub(net.unsigned_abs())
        } else {
            reserved.saturating_add(net.unsigned_abs())
        };
        self.release(give_back);
    }

    /// Drop accounted bytes: an unused reservation, a failed batch, or a
    /// bulk removal.
    pub fn release(&self, bytes: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_reserve_rejects_smaller_ceiling() {
        let tracker = QuotaTracker::new(100, 10, 0);

        tracker.reserve(10).unwrap();
        let err = tracker.reserve(1).unwrap_err();
        match err {
            Error::QuotaExceeded { kind, limit, .. } => {
                assert_eq!(kind, QuotaKind::Disk);
                assert_eq!(limit, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reserve_reports_memory_ceiling() {
        let tracker = QuotaTracker::new(5, 1000, 0);
        let err = tracker.reserve(6).unwrap_err();
        match err {
            Error::QuotaExceeded { kind, used, incoming, limit } => {
                assert_eq!(kind, QuotaKind::Memory);
                assert_eq!(used, 0);
                assert_eq!(incoming, 6);
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_settle_keeps_net_growth() {
        let tracker = QuotaTracker::new(1000, 1000, 0);

        // Overwrite that grew by 4 of the 10 reserved bytes
        tracker.reserve(10).unwrap();
        tracker.settle(10, 4);
        assert_eq!(tracker.used(), 4);

        // Batch that shrank usage overall
        tracker.reserve(2).unwrap();
        tracker.settle(2, -3);
        assert_eq!(tracker.used(), 1);
    }

    #[test]
    fn test_release_undoes_failed_reservation() {
        let tracker = QuotaTracker::new(1000, 1000, 50);
        tracker.reserve(20).unwrap();
        tracker.release(20);
        assert_eq!(tracker.used(), 50);
    }

    #[test]
    fn test_concurrent_reservations_never_overshoot() {
        let tracker = Arc::new(QuotaTracker::new(64, 64, 0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(std::thread::spawn(move || {
                let mut admitted = 0u64;
                for _ in 0..32 {
                    if tracker.reserve(1).is_ok() {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }
        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 64);
        assert_eq!(tracker.used(), 64);
    }
}
