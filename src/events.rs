use midly::{live::LiveEvent, MidiMessage};
use num_derive::FromPrimitive;
use tracing::trace;

/// Receives instrument events from an input source.
pub trait InstrumentEvents {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);
    fn note_off(&mut self, channel: u8, note: u8, velocity: u8);
    fn control_change(&mut self, channel: u8, number: u8, value: u8);
}

/// Controller numbers we react to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Controller {
    /// Damper pedal
    Sustain = 64,
}

/// Controller values at or above this count as "pedal down".
pub const PEDAL_DOWN: u8 = 64;

/// Routes a decoded MIDI event to `handler`. Returns whether a handler was
/// invoked.
///
/// Every channel is accepted. A note-on with zero velocity is a note-off.
pub fn dispatch<H>(event: &LiveEvent, handler: &mut H) -> bool
where
    H: InstrumentEvents + ?Sized,
{
    let LiveEvent::Midi { channel, message } = event else {
        return false;
    };
    let channel = channel.as_int();

    match *message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
            trace!(channel, note = key.as_int(), "note on with zero velocity");
            handler.note_off(channel, key.as_int(), 0);
        }
        MidiMessage::NoteOn { key, vel } => {
            trace!(channel, note = key.as_int(), velocity = vel.as_int(), "note on");
            handler.note_on(channel, key.as_int(), vel.as_int());
        }
        MidiMessage::NoteOff { key, vel } => {
            trace!(channel, note = key.as_int(), "note off");
            handler.note_off(channel, key.as_int(), vel.as_int());
        }
        MidiMessage::Controller { controller, value } => {
            trace!(channel, controller = controller.as_int(), value = value.as_int(), "control change");
            handler.control_change(channel, controller.as_int(), value.as_int());
        }
        _ => return false,
    }

    true
}
