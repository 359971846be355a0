//! Per-VM restart cooldown.
//!
//! Prevents restart loops: once a VM has been remediated, no further action is
//! allowed for it until the cooldown window has elapsed.
//!
//! Acquisition is a single atomic check-and-reserve. A granted
//! [`CooldownPermit`] blocks concurrent acquisitions for the same VM until it
//! is either recorded (the action went out, the window starts) or dropped
//! (no action was taken, the previous state is restored).

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::resolver::VmId;

/// Default cooldown window in seconds.
pub const DEFAULT_COOLDOWN_SECS: u64 = 300;

#[derive(Debug, Clone, Copy)]
enum Slot {
    /// A permit is outstanding; `previous` is the last recorded action, if any
    Reserved { previous: Option<DateTime<Utc>> },
    /// Last successful action
    Acted(DateTime<Utc>),
}

impl Slot {
    const fn last_action(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Reserved { previous } => previous,
            Self::Acted(at) => Some(at),
        }
    }
}

/// Shared cooldown table keyed by VM.
#[derive(Debug)]
pub struct CooldownGuard {
    window: Duration,
    slots: Mutex<HashMap<VmId, Slot>>,
}

impl CooldownGuard {
    /// Create a guard with the given window.
    #[must_use]
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: Duration::from_std(window).unwrap_or(Duration::MAX),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Try to reserve the right to remediate `vm_id` at `now`.
    ///
    /// Returns `None` while another permit for the VM is outstanding or while
    /// `now` is inside the window of the last recorded action.
    pub fn try_acquire(&self, vm_id: VmId, now: DateTime<Utc>) -> Option<CooldownPermit<'_>> {
        let mut slots = self.lock();

        let previous = match slots.get(&vm_id).copied() {
            Some(Slot::Reserved { .. }) => {
                debug!(vm_id = %vm_id, "Remediation already in flight, skipping");
                return None;
            }
            Some(Slot::Acted(last)) => {
                let elapsed = now - last;
                if elapsed < self.window {
                    debug!(
                        vm_id = %vm_id,
                        elapsed_secs = elapsed.num_seconds(),
                        cooldown_secs = self.window.num_seconds(),
                        "VM remediated recently, skipping"
                    );
                    return None;
                }
                Some(last)
            }
            None => None,
        };

        slots.insert(vm_id, Slot::Reserved { previous });

        Some(CooldownPermit {
            guard: self,
            vm_id,
            recorded: false,
        })
    }

    /// Time of the last recorded action for a VM.
    #[must_use]
    pub fn last_action(&self, vm_id: VmId) -> Option<DateTime<Utc>> {
        self.lock().get(&vm_id).and_then(|slot| slot.last_action())
    }

    /// Number of VMs with a recorded action.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.last_action().is_some())
            .count()
    }

    /// Whether no action has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<VmId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive right to remediate one VM.
///
/// Call [`CooldownPermit::record`] once the action was dispatched
/// successfully. Dropping the permit instead releases the reservation.
#[derive(Debug)]
#[must_use = "dropping a permit releases the reservation"]
pub struct CooldownPermit<'a> {
    guard: &'a CooldownGuard,
    vm_id: VmId,
    recorded: bool,
}

impl CooldownPermit<'_> {
    /// Record a successful action at `now`, starting a new window.
    pub fn record(mut self, now: DateTime<Utc>) {
        self.guard.lock().insert(self.vm_id, Slot::Acted(now));
        self.recorded = true;
        debug!(vm_id = %self.vm_id, at = %now, "Recorded remediation");
    }
}

impl Drop for CooldownPermit<'_> {
    fn drop(&mut self) {
        if self.recorded {
            return;
        }

        let mut slots = self.guard.lock();
        if let Some(Slot::Reserved { previous }) = slots.get(&self.vm_id).copied() {
            match previous {
                Some(at) => {
                    slots.insert(self.vm_id, Slot::Acted(at));
                }
                None => {
                    slots.remove(&self.vm_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn guard() -> CooldownGuard {
        CooldownGuard::new(std::time::Duration::from_secs(DEFAULT_COOLDOWN_SECS))
    }

    #[test]
    fn test_first_acquire_granted() {
        let guard = guard();
        assert!(guard.try_acquire(VmId(100), t0()).is_some());
    }

    #[test]
    fn test_window_boundaries() {
        let guard = guard();
        guard.try_acquire(VmId(100), t0()).unwrap().record(t0());

        for offset in [0, 1, 10, 299] {
            let now = t0() + Duration::seconds(offset);
            assert!(
                guard.try_acquire(VmId(100), now).is_none(),
                "offset {offset}s must be suppressed"
            );
        }

        assert!(guard
            .try_acquire(VmId(100), t0() + Duration::seconds(300))
            .is_some());
        assert!(guard
            .try_acquire(VmId(100), t0() + Duration::seconds(3600))
            .is_some());
    }

    #[test]
    fn test_outstanding_permit_blocks_second_acquire() {
        let guard = guard();
        let permit = guard.try_acquire(VmId(100), t0()).unwrap();

        assert!(guard.try_acquire(VmId(100), t0()).is_none());
        assert!(guard.try_acquire(VmId(101), t0()).is_some());

        drop(permit);
        assert!(guard.try_acquire(VmId(100), t0()).is_some());
    }

    #[test]
    fn test_dropped_permit_does_not_consume_window() {
        let guard = guard();
        drop(guard.try_acquire(VmId(100), t0()).unwrap());

        assert!(guard.is_empty());
        assert!(guard.last_action(VmId(100)).is_none());
    }

    #[test]
    fn test_dropped_permit_restores_previous_entry() {
        let guard = guard();
        guard.try_acquire(VmId(100), t0()).unwrap().record(t0());

        let later = t0() + Duration::seconds(400);
        drop(guard.try_acquire(VmId(100), later).unwrap());

        assert_eq!(guard.last_action(VmId(100)), Some(t0()));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_record_overwrites_entry() {
        let guard = guard();
        guard.try_acquire(VmId(100), t0()).unwrap().record(t0());

        let later = t0() + Duration::seconds(301);
        guard.try_acquire(VmId(100), later).unwrap().record(later);

        assert_eq!(guard.last_action(VmId(100)), Some(later));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_concurrent_acquire_grants_once() {
        let guard = std::sync::Arc::new(guard());
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = std::sync::Arc::clone(&guard);
                let barrier = std::sync::Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    match guard.try_acquire(VmId(7), t0()) {
                        Some(permit) => {
                            permit.record(t0());
                            1
                        }
                        None => 0,
                    }
                })
            })
            .collect();

        let granted: i32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 1);
    }
}
