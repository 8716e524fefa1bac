use super::OutputTransport;
use crate::render::Bitmap;
use anyhow::{Context, Result};
use image::{GrayImage, ImageFormat, Luma, imageops};
use std::io::Cursor;
use tokio::sync::watch;

/// Keeps the newest frame for clients polling the image endpoint.
pub struct PullTransport {
    latest: watch::Sender<Option<Bitmap>>,
    scale: u32,
    border: u32,
}

impl PullTransport {
    const BORDER_SHADE: u8 = 0x80;

    pub fn new(scale: u32, border: u32) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            latest,
            scale: scale.max(1),
            border,
        }
    }

    pub fn latest(&self) -> Option<Bitmap> {
        self.latest.borrow().clone()
    }

    /// BMP encoding of the newest frame, `None` before the first publish.
    pub fn encode_latest(&self) -> Result<Option<Vec<u8>>> {
        self.latest()
            .map(|frame| encode_bmp(&frame, self.scale, self.border))
            .transpose()
    }
}

impl OutputTransport for PullTransport {
    fn publish(&self, frame: &Bitmap) {
        self.latest.send_replace(Some(frame.clone()));
    }

    fn publish_every_frame(&self) -> bool {
        true
    }
}

/// Frames `frame` in a grey border of `border` pixels, scales the result by
/// `scale` and encodes it as BMP.
pub fn encode_bmp(frame: &Bitmap, scale: u32, border: u32) -> Result<Vec<u8>> {
    let content = GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        Luma([if frame.pixel(x, y) { 0xFF } else { 0x00 }])
    });

    let mut canvas = GrayImage::from_pixel(
        frame.width() + 2 * border,
        frame.height() + 2 * border,
        Luma([PullTransport::BORDER_SHADE]),
    );
    imageops::overlay(&mut canvas, &content, border.into(), border.into());

    let scaled = if scale > 1 {
        imageops::resize(
            &canvas,
            canvas.width() * scale,
            canvas.height() * scale,
            imageops::FilterType::Nearest,
        )
    } else {
        canvas
    };

    let mut bytes = Cursor::new(Vec::new());
    scaled
        .write_to(&mut bytes, ImageFormat::Bmp)
        .context("failed to encode frame as bmp")?;

    Ok(bytes.into_inner())
}
