//! Driver for SK9822 (and APA102) strips on an SPI bus.
//!
//! A frame is a 4-byte start frame of zeros, one 4-byte LED frame per pixel
//! (`0b111` + 5-bit global brightness, then blue, green, red), a 4-byte reset
//! frame and an end frame of at least one clock edge per two pixels.

use bytes::{BufMut, BytesMut};
use embedded_hal::blocking::spi::Write;

use super::{Error, LedStrip};
use crate::leds::{scale8, Rgb8};

const START_FRAME: [u8; 4] = [0x00; 4];
const RESET_FRAME: [u8; 4] = [0x00; 4];

/// LED frame header with the 5-bit global brightness at full; dimming is
/// done on the colour bytes instead.
const LED_FRAME_HEADER: u8 = 0b1110_0000 | 0b0001_1111;

pub struct Sk9822<SPI> {
    spi: SPI,
    len: usize,
    max_brightness: u8,
    frame: BytesMut,
}

impl<SPI: Write<u8>> Sk9822<SPI> {
    pub fn new(spi: SPI, len: usize) -> Self {
        Self {
            spi,
            len,
            max_brightness: 255,
            frame: BytesMut::with_capacity(frame_len(len)),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> SPI {
        self.spi
    }
}

fn end_frame_len(len: usize) -> usize {
    len / 16 + 1
}

fn frame_len(len: usize) -> usize {
    START_FRAME.len() + len * 4 + RESET_FRAME.len() + end_frame_len(len)
}

impl<SPI: Write<u8>> LedStrip for Sk9822<SPI> {
    fn len(&self) -> usize {
        self.len
    }

    fn set_max_brightness(&mut self, limit: u8) {
        self.max_brightness = limit;
    }

    fn show(&mut self, pixels: &[Rgb8]) -> Result<(), Error> {
        if pixels.len() != self.len {
            return Err(Error::Length {
                expected: self.len,
                actual: pixels.len(),
            });
        }

        let limit = self.max_brightness;

        self.frame.clear();
        self.frame.put_slice(&START_FRAME);
        for px in pixels {
            self.frame.put_u8(LED_FRAME_HEADER);
            self.frame.put_u8(scale8(px.blue, limit));
            self.frame.put_u8(scale8(px.green, limit));
            self.frame.put_u8(scale8(px.red, limit));
        }
        self.frame.put_slice(&RESET_FRAME);
        self.frame.put_bytes(0x00, end_frame_len(self.len));

        self.spi.write(&self.frame).map_err(|_| Error::Spi)
    }
}
