use std::marker::PhantomData;

use palette::{rgb::Rgb, FromColor, Hsv, Srgb};

pub type Rgb8 = Srgb<u8>;

pub const BLACK: Rgb8 = Rgb {
    red: 0,
    green: 0,
    blue: 0,
    standard: PhantomData,
};

/// 8-bit hue, saturation and value. A full hue turn is 256 steps.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Hsv8 {
    pub hue: u8,
    pub sat: u8,
    pub val: u8,
}

impl Hsv8 {
    pub fn to_rgb(self) -> Rgb8 {
        let hsv: Hsv = Hsv::new(
            self.hue as f32 * 360.0 / 256.0,
            self.sat as f32 / 255.0,
            self.val as f32 / 255.0,
        );
        let rgb: Srgb = Srgb::from_color(hsv);
        rgb.into_format()
    }
}

/// Scales `i` by `scale / 256`, where a scale of 255 keeps `i` unchanged.
pub fn scale8(i: u8, scale: u8) -> u8 {
    ((i as u16 * (1 + scale as u16)) >> 8) as u8
}

fn nscale8(c: Rgb8, scale: u8) -> Rgb8 {
    Srgb::new(
        scale8(c.red, scale),
        scale8(c.green, scale),
        scale8(c.blue, scale),
    )
}

fn qadd(a: Rgb8, b: Rgb8) -> Rgb8 {
    Srgb::new(
        a.red.saturating_add(b.red),
        a.green.saturating_add(b.green),
        a.blue.saturating_add(b.blue),
    )
}

/// The frame that gets flushed to the strip, one cell per physical LED.
#[derive(Debug, Clone)]
pub struct LedBuffer {
    cells: Box<[Rgb8]>,
}

impl LedBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            cells: vec![BLACK; len].into_boxed_slice(),
        }
    }

    pub fn set_hsv(&mut self, index: usize, color: Hsv8) {
        self.cells[index] = color.to_rgb();
    }

    pub fn clear(&mut self) {
        self.cells.fill(BLACK);
    }

    pub fn as_slice(&self) -> &[Rgb8] {
        &self.cells
    }

    /// Fades every cell and bleeds part of it into both neighbours.
    ///
    /// Each cell keeps `255 - amount` of itself and hands `amount / 2` of
    /// itself to the cell on each side. Light falling off either end is lost.
    pub fn blur(&mut self, amount: u8) {
        let keep = 255 - amount;
        let seep = amount >> 1;
        let mut carryover = BLACK;

        for i in 0..self.cells.len() {
            let cur = self.cells[i];
            let part = nscale8(cur, seep);

            if i > 0 {
                self.cells[i - 1] = qadd(self.cells[i - 1], part);
            }
            self.cells[i] = qadd(nscale8(cur, keep), carryover);
            carryover = part;
        }
    }
}

#[cfg(test)]
mod test {
    use palette::Srgb;

    use super::*;

    #[test]
    fn scale8_endpoints() {
        assert_eq!(scale8(200, 255), 200);
        assert_eq!(scale8(200, 0), 0);
        assert_eq!(scale8(255, 127), 127);
    }

    #[test]
    fn blur_spreads_to_neighbours() {
        let mut leds = LedBuffer::new(5);
        leds.cells[2] = Srgb::new(200, 0, 0);

        leds.blur(85);

        let reds: Vec<_> = leds.as_slice().iter().map(|c| c.red).collect();
        // keep = 170, seep = 42
        assert_eq!(reds, vec![0, 33, 133, 33, 0]);
        assert!(leds.as_slice().iter().all(|c| c.green == 0 && c.blue == 0));
    }

    #[test]
    fn blur_fades_to_black() {
        let mut leds = LedBuffer::new(8);
        for i in 0..8 {
            leds.set_hsv(i, Hsv8 { hue: 32 * i as u8, sat: 255, val: 255 });
        }

        for _ in 0..200 {
            leds.blur(25);
        }

        assert!(leds.as_slice().iter().all(|c| *c == BLACK));
    }

    #[test]
    fn blur_of_black_is_black() {
        let mut leds = LedBuffer::new(4);
        leds.blur(85);
        assert!(leds.as_slice().iter().all(|c| *c == BLACK));
    }

    #[test]
    fn hsv_conversion() {
        assert_eq!(Hsv8 { hue: 0, sat: 255, val: 255 }.to_rgb(), Srgb::new(255, 0, 0));
        assert_eq!(Hsv8 { hue: 0, sat: 0, val: 0 }.to_rgb(), BLACK);
        assert_eq!(Hsv8 { hue: 100, sat: 0, val: 255 }.to_rgb(), Srgb::new(255, 255, 255));
    }

    #[test]
    fn clear_blanks_everything() {
        let mut leds = LedBuffer::new(3);
        leds.set_hsv(1, Hsv8 { hue: 10, sat: 255, val: 255 });
        leds.clear();
        assert!(leds.as_slice().iter().all(|c| *c == BLACK));
    }
}
