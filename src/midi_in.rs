use std::{path::Path, time::Duration};

use anyhow::{anyhow, Context};
use midir::{Ignore, MidiInput, MidiInputConnection};
use midly::stream::MidiStream;
use rppal::uart::{Parity, Uart};
use tracing::{debug, info, warn};

use crate::events::{dispatch, InstrumentEvents};

/// Standard DIN MIDI line speed.
pub const MIDI_BAUD_RATE: u32 = 31250;

/// Something that delivers instrument events when polled.
pub trait EventSource {
    /// Delivers every event that has arrived since the last call and returns
    /// how many reached `handler`. Never blocks.
    fn service(&mut self, handler: &mut dyn InstrumentEvents) -> anyhow::Result<usize>;
}

/// Turns a raw MIDI byte stream (with running status) into handler calls.
pub struct MidiDecoder {
    stream: MidiStream,
}

impl Default for MidiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiDecoder {
    pub fn new() -> Self {
        Self {
            stream: MidiStream::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8], handler: &mut dyn InstrumentEvents) -> usize {
        let mut delivered = 0;
        self.stream.feed(bytes, |event| {
            if dispatch(&event, &mut *handler) {
                delivered += 1;
            }
        });
        delivered
    }
}

/// MIDI over a UART, e.g. a DIN socket wired to the GPIO header.
pub struct SerialSource {
    uart: Uart,
    decoder: MidiDecoder,
    buf: [u8; 64],
}

impl SerialSource {
    pub fn open(path: impl AsRef<Path>, baud_rate: u32) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut uart = Uart::with_path(path, baud_rate, Parity::None, 8, 1)
            .with_context(|| format!("failed to open uart {path:?}"))?;

        // return immediately with whatever is buffered
        uart.set_read_mode(0, Duration::ZERO)
            .context("failed to make uart non-blocking")?;

        info!("reading midi from {path:?} at {baud_rate} baud");

        Ok(Self {
            uart,
            decoder: MidiDecoder::new(),
            buf: [0; 64],
        })
    }
}

impl EventSource for SerialSource {
    fn service(&mut self, handler: &mut dyn InstrumentEvents) -> anyhow::Result<usize> {
        let mut delivered = 0;

        loop {
            let n = self.uart.read(&mut self.buf).context("uart read failed")?;
            if n == 0 {
                break;
            }
            delivered += self.decoder.feed(&self.buf[..n], handler);
        }

        Ok(delivered)
    }
}

/// Carries whole MIDI messages from a callback thread to the control loop.
///
/// Unbounded: a stalled loop must not lose a note-off or pedal change.
pub struct MessageQueue {
    tx: flume::Sender<Vec<u8>>,
    rx: flume::Receiver<Vec<u8>>,
    decoder: MidiDecoder,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            decoder: MidiDecoder::new(),
        }
    }

    pub fn sender(&self) -> flume::Sender<Vec<u8>> {
        self.tx.clone()
    }

    /// Replays everything queued so far into `handler`.
    pub fn drain(&mut self, handler: &mut dyn InstrumentEvents) -> usize {
        let mut delivered = 0;
        for message in self.rx.try_iter() {
            delivered += self.decoder.feed(&message, handler);
        }
        delivered
    }
}

fn forward(tx: &flume::Sender<Vec<u8>>, message: &[u8]) {
    if let Err(err) = tx.send(message.to_vec()) {
        warn!("dropping midi message {:02x?}: control loop has gone", err.into_inner());
    }
}

/// MIDI from a system port (USB, ALSA sequencer).
///
/// midir calls back on its own thread, so messages are queued and replayed
/// on the control loop by `service`.
pub struct PortSource {
    _connection: MidiInputConnection<()>,
    queue: MessageQueue,
}

impl PortSource {
    /// Connects to the first input port whose name contains `port_name`.
    pub fn connect(client_name: &str, port_name: &str) -> anyhow::Result<Self> {
        let mut input = MidiInput::new(client_name).context("failed to open midi input")?;
        input.ignore(Ignore::All);

        let ports = input.ports();
        let port = ports
            .iter()
            .find(|p| {
                input
                    .port_name(p)
                    .map(|name| name.contains(port_name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("no midi input port matching {port_name:?}"))?;
        let name = input.port_name(port).context("failed to read port name")?;

        let queue = MessageQueue::new();
        let tx = queue.sender();
        let connection = input
            .connect(
                port,
                &format!("{client_name} In"),
                move |_stamp, message, _| forward(&tx, message),
                (),
            )
            .map_err(|err| anyhow!("failed to connect to {name:?}: {err}"))?;

        info!("reading midi from port {name:?}");

        Ok(Self {
            _connection: connection,
            queue,
        })
    }
}

impl EventSource for PortSource {
    fn service(&mut self, handler: &mut dyn InstrumentEvents) -> anyhow::Result<usize> {
        Ok(self.queue.drain(handler))
    }
}

/// Names of every MIDI input port on the system.
pub fn list_ports(client_name: &str) -> anyhow::Result<Vec<String>> {
    let input = MidiInput::new(client_name).context("failed to open midi input")?;
    let names = input
        .ports()
        .iter()
        .filter_map(|p| input.port_name(p).ok())
        .collect::<Vec<_>>();
    debug!("found {} midi input ports", names.len());
    Ok(names)
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::{forward, MessageQueue, MidiDecoder};
    use crate::events::test::{Received, Recorder};

    #[test]
    fn decodes_running_status() {
        let mut decoder = MidiDecoder::new();
        let mut rec = Recorder::default();

        let n = decoder.feed(&[0x90, 60, 100, 62, 90, 0x80, 60, 0], &mut rec);

        assert_eq!(n, 3);
        assert_eq!(
            rec.0,
            vec![
                Received::On(0, 60, 100),
                Received::On(0, 62, 90),
                Received::Off(0, 60, 0),
            ]
        );
    }

    #[test]
    fn messages_split_across_reads() {
        let mut decoder = MidiDecoder::new();
        let mut rec = Recorder::default();

        assert_eq!(decoder.feed(&[0xB2, 64], &mut rec), 0);
        assert_eq!(decoder.feed(&[127], &mut rec), 1);
        assert_eq!(rec.0, vec![Received::Cc(2, 64, 127)]);
    }

    #[test]
    fn skips_realtime_and_unhandled() {
        let mut decoder = MidiDecoder::new();
        let mut rec = Recorder::default();

        // clock inside a note on, then a program change
        let n = decoder.feed(&[0x91, 0xF8, 40, 0, 0xC0, 7], &mut rec);

        assert_eq!(n, 1);
        assert_eq!(rec.0, vec![Received::Off(1, 40, 0)]);
    }

    #[test]
    fn queue_keeps_every_message_while_loop_is_stalled() {
        let mut queue = MessageQueue::new();
        let tx = queue.sender();

        // far more than a small bounded channel would hold
        let sender = thread::spawn(move || {
            for i in 0..2000u32 {
                let note = (i % 88) as u8 + 21;
                forward(&tx, &[0x90, note, 100]);
                forward(&tx, &[0x80, note, 0]);
            }
            forward(&tx, &[0xB0, 64, 127]);
        });
        sender.join().unwrap();

        let mut rec = Recorder::default();
        assert_eq!(queue.drain(&mut rec), 4001);

        let offs = rec.0.iter().filter(|r| matches!(r, Received::Off(..))).count();
        assert_eq!(offs, 2000);
        assert_eq!(rec.0.last(), Some(&Received::Cc(0, 64, 127)));
    }

    #[test]
    fn drain_on_empty_queue_delivers_nothing() {
        let mut queue = MessageQueue::new();
        let mut rec = Recorder::default();
        assert_eq!(queue.drain(&mut rec), 0);
        assert!(rec.0.is_empty());
    }
}
