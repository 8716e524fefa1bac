//! Frame delivery to the physical or remote display.

pub mod pull;
pub mod push;

use crate::render::Bitmap;
#[cfg(feature = "mock")]
use mockall::automock;

#[cfg_attr(feature = "mock", automock)]
pub trait OutputTransport: Send + Sync {
    /// Hands over the newest frame. Never blocks the caller.
    fn publish(&self, frame: &Bitmap);

    /// Whether every freshly rendered frame should be published instead of
    /// following the push cadence.
    fn publish_every_frame(&self) -> bool {
        false
    }
}
