use std::time::Instant;

use num_traits::FromPrimitive;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::{
    driver::{self, LedStrip},
    events::{Controller, InstrumentEvents, PEDAL_DOWN},
    keys::KeyStates,
    leds::{Hsv8, LedBuffer},
    mapping::{linear_map, BrightnessCurve},
    schedule::{Action, DecayPolicy, Pedal, Schedule},
};

/// Every lit key is fully saturated.
const SATURATION: u8 = 255;

/// How the instrument's keys line up with the strip.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeyLayout {
    pub num_keys: usize,
    /// Note number of the lowest key
    pub min_note: u8,
    /// Note number of the highest key
    pub max_note: u8,
    pub num_leds: usize,
    /// LED lit by the lowest key
    pub start_led: usize,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            num_keys: 76,
            min_note: 28,
            max_note: 116,
            num_leds: 64,
            start_led: 0,
        }
    }
}

impl KeyLayout {
    /// Key index for `note`, if the note is on the keyboard.
    pub fn key_index(&self, note: u8) -> Option<usize> {
        if note < self.min_note || note > self.max_note {
            return None;
        }

        let index = (note - self.min_note) as usize;
        (index < self.num_keys).then_some(index)
    }

    pub fn led_index(&self, key: usize) -> usize {
        linear_map(
            key as i64,
            0,
            self.num_keys as i64 - 1,
            self.start_led as i64,
            self.num_leds as i64 - 1,
        ) as usize
    }

    /// Hue for `key` before any hue shift; the keyboard spans one colour wheel.
    pub fn base_hue(&self, key: usize) -> u8 {
        linear_map(key as i64, 0, self.num_keys as i64 - 1, 0, 255) as u8
    }
}

/// All state shared between the event handlers and the render loop.
pub struct LightController {
    layout: KeyLayout,
    curve: BrightnessCurve,
    keys: KeyStates,
    sustain: bool,
    hue_shift: u8,
    leds: LedBuffer,
    schedule: Schedule,
}

impl LightController {
    pub fn new(
        layout: KeyLayout,
        decay: &DecayPolicy,
        curve: BrightnessCurve,
        start: Instant,
    ) -> Self {
        Self {
            layout,
            curve,
            keys: KeyStates::new(layout.num_keys),
            sustain: false,
            hue_shift: 0,
            leds: LedBuffer::new(layout.num_leds),
            schedule: Schedule::from_decay(decay, start),
        }
    }

    #[cfg(test)]
    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    #[cfg(test)]
    pub fn keys(&self) -> &KeyStates {
        &self.keys
    }

    #[cfg(test)]
    pub fn leds(&self) -> &LedBuffer {
        &self.leds
    }

    #[cfg(test)]
    pub fn sustain(&self) -> bool {
        self.sustain
    }

    #[cfg(test)]
    pub fn hue_shift(&self) -> u8 {
        self.hue_shift
    }

    pub fn key_hue(&self, key: usize) -> u8 {
        self.layout.base_hue(key).wrapping_add(self.hue_shift)
    }

    /// Applies whatever decay is due at `now`, then paints every held key.
    pub fn render(&mut self, now: Instant) {
        let pedal = Pedal::from_sustain(self.sustain);

        for action in self.schedule.due(pedal, now) {
            match action {
                Action::Blur(amount) => self.leds.blur(amount),
                Action::AdvanceHue => self.hue_shift = self.hue_shift.wrapping_add(1),
            }
        }

        // keys sharing an LED overwrite each other; the highest key wins
        for (key, velocity) in self.keys.pressed() {
            let led = self.layout.led_index(key);
            let color = Hsv8 {
                hue: self.key_hue(key),
                sat: SATURATION,
                val: self.curve.apply(velocity),
            };
            self.leds.set_hsv(led, color);
        }
    }

    /// Renders one frame and pushes it to the strip.
    pub fn frame<S: LedStrip>(&mut self, now: Instant, strip: &mut S) -> Result<(), driver::Error> {
        self.render(now);
        strip.show(self.leds.as_slice())
    }

    /// Blanks the buffer and the strip.
    pub fn blackout<S: LedStrip>(&mut self, strip: &mut S) -> Result<(), driver::Error> {
        self.leds.clear();
        strip.show(self.leds.as_slice())
    }
}

impl InstrumentEvents for LightController {
    fn note_on(&mut self, _channel: u8, note: u8, velocity: u8) {
        match self.layout.key_index(note) {
            Some(key) => self.keys.set_pressed(key, velocity),
            None => trace!(note, "ignoring note on outside the keyboard"),
        }
    }

    fn note_off(&mut self, _channel: u8, note: u8, _velocity: u8) {
        if let Some(key) = self.layout.key_index(note) {
            self.keys.set_released(key);
        }
    }

    fn control_change(&mut self, _channel: u8, number: u8, value: u8) {
        if let Some(Controller::Sustain) = Controller::from_u8(number) {
            let sustain = value >= PEDAL_DOWN;
            if sustain != self.sustain {
                debug!(sustain, "pedal changed");
            }
            self.sustain = sustain;
        }
    }
}
