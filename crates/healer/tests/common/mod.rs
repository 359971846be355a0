//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use notify::{ChannelError, Notifier, NotifyChannel, NotifyEvent};
use vm_healer::{
    Clock, ControlClient, ControlError, CooldownGuard, PolicyEngine, VmId, VmMapping, VmStatus,
};

// =============================================================================
// Fake control plane
// =============================================================================

/// Control client that records calls instead of talking to Proxmox.
pub struct FakeControl {
    status: Mutex<VmStatus>,
    fail_start: AtomicBool,
    fail_status: AtomicBool,
    start_delay: Option<Duration>,
    pub status_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub reboot_calls: AtomicUsize,
    pub started: Mutex<Vec<VmId>>,
}

impl FakeControl {
    pub fn new(status: VmStatus) -> Self {
        Self {
            status: Mutex::new(status),
            fail_start: AtomicBool::new(false),
            fail_status: AtomicBool::new(false),
            start_delay: None,
            status_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            reboot_calls: AtomicUsize::new(0),
            started: Mutex::new(vec![]),
        }
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn set_status(&self, status: VmStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn total_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
            + self.start_calls.load(Ordering::SeqCst)
            + self.reboot_calls.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn reboots(&self) -> usize {
        self.reboot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlClient for FakeControl {
    async fn status(&self, _vm_id: VmId) -> Result<VmStatus, ControlError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(ControlError::Api {
                status: 500,
                message: "status unavailable".to_string(),
            });
        }
        Ok(self.status.lock().unwrap().clone())
    }

    async fn start(&self, vm_id: VmId) -> Result<(), ControlError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ControlError::Api {
                status: 500,
                message: "start failed".to_string(),
            });
        }
        self.started.lock().unwrap().push(vm_id);
        Ok(())
    }

    async fn reboot(&self, _vm_id: VmId) -> Result<(), ControlError> {
        self.reboot_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Recording notification channel
// =============================================================================

/// Channel that keeps every event it receives.
#[derive(Default)]
pub struct RecordingChannel {
    pub events: Mutex<Vec<NotifyEvent>>,
}

impl RecordingChannel {
    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(NotifyEvent::message)
            .collect()
    }
}

#[async_trait]
impl NotifyChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// =============================================================================
// Manual clock
// =============================================================================

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub engine: Arc<PolicyEngine>,
    pub control: Arc<FakeControl>,
    pub notifications: Arc<RecordingChannel>,
    pub clock: Arc<ManualClock>,
    pub cooldown: Arc<CooldownGuard>,
}

/// Mapping used by the reference scenarios.
pub fn scenario_mapping() -> VmMapping {
    VmMapping::new(HashMap::from([("10.0.0.5:9100".to_string(), VmId(100))]))
}

pub fn harness(control: FakeControl) -> Harness {
    harness_with(scenario_mapping(), control)
}

pub fn harness_with(mapping: VmMapping, control: FakeControl) -> Harness {
    let control = Arc::new(control);
    let notifications = Arc::new(RecordingChannel::default());
    let clock = Arc::new(ManualClock::new());
    let cooldown = Arc::new(CooldownGuard::new(Duration::from_secs(300)));
    let channel: Arc<dyn NotifyChannel> = notifications.clone();

    let engine = PolicyEngine::new(
        mapping,
        Arc::clone(&cooldown),
        control.clone(),
        Arc::new(Notifier::with_channels(vec![channel])),
    )
    .with_clock(clock.clone());

    Harness {
        engine: Arc::new(engine),
        control,
        notifications,
        clock,
        cooldown,
    }
}
