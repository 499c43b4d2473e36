//! Input event classification and trigger debouncing.
//!
//! `InputFilter::handle_event` runs on whatever thread delivers input. It
//! never blocks: the debounce check is a compare-and-swap, worker wakes are
//! `try_send`s and arming the expiry is an unbounded send.

use crate::engine::BoostEngine;
use crate::expiry::ExpiryHandle;
use crate::stats::BoostCounters;
use crate::worker::{WakeResult, WorkerWaker};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Linux input event codes used by the filter.
pub mod codes {
    /// Key and button events.
    pub const EV_KEY: u16 = 0x01;
    /// Absolute axis events.
    pub const EV_ABS: u16 = 0x03;

    /// Absolute X axis.
    pub const ABS_X: u16 = 0x00;
    /// Absolute Y axis.
    pub const ABS_Y: u16 = 0x01;
    /// Multitouch contact X.
    pub const ABS_MT_POSITION_X: u16 = 0x35;
    /// Multitouch contact Y.
    pub const ABS_MT_POSITION_Y: u16 = 0x36;
    /// Multitouch contact id; `-1` releases the contact.
    pub const ABS_MT_TRACKING_ID: u16 = 0x39;

    /// Volume down key.
    pub const KEY_VOLUMEDOWN: u16 = 114;
    /// Volume up key.
    pub const KEY_VOLUMEUP: u16 = 115;
    /// Power key.
    pub const KEY_POWER: u16 = 116;
    /// Touch contact button.
    pub const BTN_TOUCH: u16 = 0x14a;
}

/// A single input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Event type (`EV_*`).
    pub kind: u16,
    /// Event code within the type.
    pub code: u16,
    /// Event value.
    pub value: i32,
}

impl InputEvent {
    /// Build an event.
    #[must_use]
    pub const fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { kind, code, value }
    }

    /// A new multitouch contact with `tracking_id`.
    #[must_use]
    pub const fn touch_down(tracking_id: i32) -> Self {
        Self::new(codes::EV_ABS, codes::ABS_MT_TRACKING_ID, tracking_id)
    }

    /// A multitouch contact release.
    #[must_use]
    pub const fn touch_up() -> Self {
        Self::new(codes::EV_ABS, codes::ABS_MT_TRACKING_ID, -1)
    }

    /// A key press.
    #[must_use]
    pub const fn key_press(code: u16) -> Self {
        Self::new(codes::EV_KEY, code, 1)
    }

    /// A key release.
    #[must_use]
    pub const fn key_release(code: u16) -> Self {
        Self::new(codes::EV_KEY, code, 0)
    }
}

/// Touch-down or a power/volume key press.
#[inline]
#[must_use]
pub fn is_boost_worthy(event: &InputEvent) -> bool {
    match event.kind {
        codes::EV_ABS => event.code == codes::ABS_MT_TRACKING_ID && event.value != -1,
        codes::EV_KEY => {
            event.value == 1
                && matches!(
                    event.code,
                    codes::KEY_POWER | codes::KEY_VOLUMEUP | codes::KEY_VOLUMEDOWN
                )
        }
        _ => false,
    }
}

/// Device classes the filter attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Reports multitouch positions.
    MultiTouch,
    /// Reports a touch button plus absolute X/Y.
    Touchpad,
    /// Reports any key.
    Keypad,
}

/// Capabilities advertised by an input device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct DeviceCapabilities {
    /// Supports `EV_ABS`.
    pub ev_abs: bool,
    /// Supports `EV_KEY`.
    pub ev_key: bool,
    /// Has `ABS_MT_POSITION_X`.
    pub abs_mt_position_x: bool,
    /// Has `ABS_MT_POSITION_Y`.
    pub abs_mt_position_y: bool,
    /// Has `ABS_X`.
    pub abs_x: bool,
    /// Has `ABS_Y`.
    pub abs_y: bool,
    /// Has `BTN_TOUCH`.
    pub btn_touch: bool,
}

impl DeviceCapabilities {
    /// First matching class in the attach table, if any.
    #[must_use]
    pub fn device_class(&self) -> Option<DeviceClass> {
        if self.ev_abs && self.abs_mt_position_x && self.abs_mt_position_y {
            Some(DeviceClass::MultiTouch)
        } else if self.btn_touch && self.abs_x && self.abs_y {
            Some(DeviceClass::Touchpad)
        } else if self.ev_key {
            Some(DeviceClass::Keypad)
        } else {
            None
        }
    }
}

/// What `handle_event` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Not a boost-worthy event.
    Ignored,
    /// Boost-worthy, but no CPU has a boost frequency.
    Disabled,
    /// Inside the window of the previous accepted trigger.
    Debounced,
    /// A new boost cycle started.
    Boosted {
        /// Generation of the new cycle.
        generation: u64,
        /// Workers that received a fresh wake.
        woken: usize,
    },
}

const NEVER: u64 = u64::MAX;

/// Turns raw input into boost cycles.
pub struct InputFilter {
    engine: Arc<BoostEngine>,
    wakers: Box<[Option<WorkerWaker>]>,
    expiry: ExpiryHandle,
    epoch: Instant,
    last_trigger_us: AtomicU64,
}

impl std::fmt::Debug for InputFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFilter")
            .field("wakers", &self.wakers)
            .field("last_trigger_us", &self.last_trigger_us)
            .finish_non_exhaustive()
    }
}

impl InputFilter {
    pub(crate) fn new(
        engine: Arc<BoostEngine>,
        wakers: Vec<Option<WorkerWaker>>,
        expiry: ExpiryHandle,
    ) -> Self {
        Self {
            engine,
            wakers: wakers.into_boxed_slice(),
            expiry,
            epoch: Instant::now(),
            last_trigger_us: AtomicU64::new(NEVER),
        }
    }

    /// Classify `event` and start a boost cycle if warranted.
    pub fn handle_event(&self, event: &InputEvent) -> TriggerOutcome {
        if !is_boost_worthy(event) {
            return TriggerOutcome::Ignored;
        }
        let tunables = &self.engine.tunables;
        if !tunables.is_enabled() {
            BoostCounters::bump(&self.engine.counters.triggers_disabled);
            return TriggerOutcome::Disabled;
        }

        let now = Instant::now();
        let now_us = u64::try_from(now.duration_since(self.epoch).as_micros()).unwrap_or(NEVER - 1);
        let window_us = u64::from(tunables.window_ms()) * 1000;

        let mut last = self.last_trigger_us.load(Ordering::Acquire);
        loop {
            if last != NEVER && now_us.saturating_sub(last) < window_us {
                BoostCounters::bump(&self.engine.counters.triggers_debounced);
                return TriggerOutcome::Debounced;
            }
            match self.last_trigger_us.compare_exchange_weak(
                last,
                now_us,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => last = actual,
            }
        }

        // Workers check the generation, so it must move before they wake.
        let generation = self.engine.begin_cycle();
        let counters = &self.engine.counters;

        let mut woken = 0;
        for (cluster, waker) in self.wakers.iter().enumerate() {
            if !tunables.should_wake(cluster) {
                continue;
            }
            let Some(waker) = waker else { continue };
            match waker.wake(now) {
                WakeResult::Queued => {
                    woken += 1;
                    BoostCounters::bump(&counters.wakes_sent);
                }
                WakeResult::Coalesced => BoostCounters::bump(&counters.wakes_coalesced),
                WakeResult::Stopped => {}
            }
        }

        self.expiry.arm(tunables.window(), generation);
        BoostCounters::bump(&counters.expiries_armed);
        BoostCounters::bump(&counters.triggers_accepted);
        trace!(generation, woken, "Input boost triggered");

        TriggerOutcome::Boosted { generation, woken }
    }
}
