//! Text views to 1-bit frames.

use crate::{
    config::{DisplayConfig, Font},
    ui::{SignalLevel, View},
};
use embedded_graphics::{
    mono_font::{
        MonoFont, MonoTextStyle,
        ascii::{FONT_4X6, FONT_5X7, FONT_5X8, FONT_6X10},
    },
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use std::convert::Infallible;

/// Fixed-size monochrome frame, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.pixels[self.index(x, y)]
    }

    #[cfg(test)]
    pub(crate) fn lit_pixels(&self) -> usize {
        self.pixels.iter().filter(|on| **on).count()
    }

    /// One byte per pixel, `0x00` off and `0xFF` on.
    pub fn flattened(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .map(|on| if *on { 0xFF } else { 0x00 })
            .collect()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

impl OriginDimensions for Bitmap {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Bitmap {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            let (x, y) = (point.x as u32, point.y as u32);
            if x < self.width && y < self.height {
                let index = self.index(x, y);
                self.pixels[index] = color.is_on();
            }
        }
        Ok(())
    }
}

pub struct Renderer {
    width: u32,
    height: u32,
    line_height: u32,
    font: &'static MonoFont<'static>,
}

impl Renderer {
    const SIGNAL_ICON_WIDTH: u32 = 20;
    const BAR_WIDTH: u32 = 3;
    const BAR_GAP: u32 = 1;

    pub fn new(display: &DisplayConfig) -> Self {
        Self {
            width: display.width(),
            height: display.height(),
            line_height: display.line_height(),
            font: mono_font(display.font),
        }
    }

    /// Text lines that fit on the display.
    pub fn rows(&self) -> usize {
        (self.height / self.line_height.max(1)).max(1) as usize
    }

    pub fn blank(&self) -> Bitmap {
        Bitmap::new(self.width, self.height)
    }

    /// Draws `view` on a cleared frame.
    pub fn render(&self, view: &View) -> Bitmap {
        let mut frame = self.blank();
        let style = MonoTextStyle::new(self.font, BinaryColor::On);

        for (row, line) in view.lines.iter().enumerate() {
            let y = row as u32 * self.line_height;
            if y >= self.height {
                break;
            }
            let _ = Text::with_baseline(line, Point::new(0, y as i32), style, Baseline::Top)
                .draw(&mut frame);
        }

        if let Some(level) = view.signal {
            self.draw_signal(&mut frame, level);
        }

        frame
    }

    /// Bars of rising height right-aligned next to the first rows. Unlit bars
    /// keep a one pixel baseline so the icon stays recognisable.
    fn draw_signal(&self, frame: &mut Bitmap, level: SignalLevel) {
        let left = self.width.saturating_sub(Self::SIGNAL_ICON_WIDTH);
        let bottom = self.line_height * 2;
        let step = (self.line_height / SignalLevel::MAX as u32).max(1) * 2;
        let fill = PrimitiveStyle::with_fill(BinaryColor::On);

        for bar in 0..SignalLevel::MAX as u32 {
            let height = if bar < level.bars() as u32 {
                step * (bar + 1) / 2
            } else {
                1
            };
            let x = left + bar * (Self::BAR_WIDTH + Self::BAR_GAP);
            let _ = Rectangle::new(
                Point::new(x as i32, bottom as i32 - height as i32),
                Size::new(Self::BAR_WIDTH, height),
            )
            .into_styled(fill)
            .draw(frame);
        }
    }
}

fn mono_font(font: Font) -> &'static MonoFont<'static> {
    match font {
        Font::Font4x6 => &FONT_4X6,
        Font::Font5x7 => &FONT_5X7,
        Font::Font5x8 => &FONT_5X8,
        Font::Font6x10 => &FONT_6X10,
    }
}
