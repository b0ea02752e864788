use std::time::Duration;

use thiserror::Error;

use crate::leds::Rgb8;

pub mod sk9822;

#[derive(Debug, Error)]
pub enum Error {
    #[error("spi error")]
    Spi,
    #[error("frame has {actual} pixels but the strip has {expected}")]
    Length { expected: usize, actual: usize },
}

/// A fixed-length strip that shows a whole frame at once.
pub trait LedStrip {
    fn len(&self) -> usize;

    /// Global limiter applied to every frame, 1 to 255.
    fn set_max_brightness(&mut self, limit: u8);

    fn show(&mut self, pixels: &[Rgb8]) -> Result<(), Error>;
}

pub struct ThreadDelay;

impl embedded_hal::blocking::delay::DelayUs<u32> for ThreadDelay {
    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64))
    }
}
