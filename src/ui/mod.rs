//! Navigation state machine: status pages, menu tree and overlays.
//!
//! Everything in here produces [`View`]s; turning them into pixels is the
//! job of [`crate::render`].

pub mod controller;
pub mod menu;
pub mod overlay;
pub mod status_view;
pub mod wifi;

#[cfg(test)]
mod testing;

/// The two logical buttons of the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    Primary,
    Secondary,
}

/// Discretized Wi-Fi signal strength, `0..=4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignalLevel(u8);

impl SignalLevel {
    pub const MAX: u8 = 4;

    pub fn from_strength(strength: i32) -> Self {
        if strength <= 0 {
            Self(0)
        } else if strength >= 100 {
            Self(Self::MAX)
        } else {
            Self((strength / 25 + 1) as u8)
        }
    }

    pub fn bars(self) -> u8 {
        self.0
    }
}

/// Content of one screen: text rows from the top plus an optional signal
/// icon next to the first row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct View {
    pub lines: Vec<String>,
    pub signal: Option<SignalLevel>,
}

impl View {
    pub fn text<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            signal: None,
        }
    }
}
