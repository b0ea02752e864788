use std::time::{Duration, Instant};

use serde::Deserialize;

/// Fires at most once per `period` of wall-clock time, however often it is
/// polled.
#[derive(Debug, Clone)]
pub struct Timer {
    last_fired: Instant,
    period: Duration,
}

impl Timer {
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            last_fired: start,
            period,
        }
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_fired) >= self.period {
            self.last_fired = now;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Pedal {
    Sustained,
    Released,
}

impl Pedal {
    pub fn from_sustain(sustain: bool) -> Self {
        if sustain {
            Pedal::Sustained
        } else {
            Pedal::Released
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    /// Fade and spread the strip with the given strength.
    Blur(u8),
    /// Rotate every key's hue by one step.
    AdvanceHue,
}

/// Decay timing for both pedal states.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DecayPolicy {
    pub sustained_blur: u8,
    pub sustained_blur_ms: u64,
    pub hue_shift_ms: u64,
    pub released_blur: u8,
    pub released_blur_ms: u64,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            sustained_blur: 85,
            sustained_blur_ms: 100,
            hue_shift_ms: 500,
            released_blur: 25,
            released_blur_ms: 6,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    when: Pedal,
    timer: Timer,
    action: Action,
}

/// A table of periodic actions, each gated on the pedal state.
///
/// Only entries matching the current pedal state are polled, so an entry
/// that was gated off fires on its first poll once its period has elapsed.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    entries: Vec<Entry>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_decay(policy: &DecayPolicy, start: Instant) -> Self {
        Self::new()
            .every(
                Pedal::Sustained,
                Duration::from_millis(policy.sustained_blur_ms),
                Action::Blur(policy.sustained_blur),
                start,
            )
            .every(
                Pedal::Sustained,
                Duration::from_millis(policy.hue_shift_ms),
                Action::AdvanceHue,
                start,
            )
            .every(
                Pedal::Released,
                Duration::from_millis(policy.released_blur_ms),
                Action::Blur(policy.released_blur),
                start,
            )
    }

    pub fn every(mut self, when: Pedal, period: Duration, action: Action, start: Instant) -> Self {
        self.entries.push(Entry {
            when,
            timer: Timer::new(period, start),
            action,
        });
        self
    }

    /// Actions due at `now` for the given pedal state, in table order.
    pub fn due(&mut self, pedal: Pedal, now: Instant) -> impl Iterator<Item = Action> + '_ {
        self.entries
            .iter_mut()
            .filter(move |entry| entry.when == pedal)
            .filter_map(move |entry| entry.timer.ready(now).then_some(entry.action))
    }
}
