//! Local key and remote button sources feeding the control loop.
//!
//! Both sources only decode their raw events and forward [`Button`]s into one
//! channel; the control loop is the single consumer.

use crate::{
    config::{ButtonsServerConfig, KeyConfig},
    transport::push::Endpoint,
    ui::Button,
};
use anyhow::{Context, Result};
use evdev::{EventType, Key};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use zeromq::{Socket, SocketRecv, SubSocket};

/// Key events fire on release only.
pub fn decode_key(code: u16, value: i32, keys: &KeyConfig) -> Option<Button> {
    const RELEASED: i32 = 0;

    if value != RELEASED {
        return None;
    }

    if code == keys.primary {
        Some(Button::Primary)
    } else if code == keys.secondary {
        Some(Button::Secondary)
    } else {
        None
    }
}

/// Remote events carry the button code as magnitude; only the sign matching
/// `direction` means pressed.
pub fn decode_remote(value: i32, buttons: &ButtonsServerConfig) -> Option<Button> {
    let code = value.checked_abs()?;

    if code * buttons.direction != value {
        return None;
    }

    if code == buttons.button_a {
        Some(Button::Primary)
    } else if code == buttons.button_b {
        Some(Button::Secondary)
    } else {
        None
    }
}

#[derive(Clone)]
pub struct InputDispatcher {
    tx: Sender<Button>,
}

impl InputDispatcher {
    const QUEUE_DEPTH: usize = 16;
    const RECONNECT_DELAY: Duration = Duration::from_secs(1);

    pub fn new() -> (Self, Receiver<Button>) {
        let (tx, rx) = mpsc::channel(Self::QUEUE_DEPTH);
        (Self { tx }, rx)
    }

    pub fn dispatch(&self, button: Button) {
        debug!("input: {button:?}");

        match self.tx.try_send(button) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("input queue full, dropped {button:?}"),
            Err(TrySendError::Closed(_)) => debug!("input queue closed"),
        }
    }

    /// Starts one listener per input device that has the primary key.
    /// Returns the number of listeners.
    pub fn spawn_keyboard(&self, keys: KeyConfig) -> usize {
        let mut listeners = 0;

        for (path, device) in evdev::enumerate() {
            if !device
                .supported_keys()
                .is_some_and(|supported| supported.contains(Key::new(keys.primary)))
            {
                continue;
            }

            let name = device.name().unwrap_or("unnamed").to_string();
            match device.into_event_stream() {
                Ok(events) => {
                    info!("reading keys from {name} ({})", path.display());
                    let dispatcher = self.clone();
                    tokio::spawn(async move { dispatcher.read_keys(events, keys, name).await });
                    listeners += 1;
                }
                Err(e) => warn!("failed to open {}: {e}", path.display()),
            }
        }

        if listeners == 0 {
            warn!("no input device provides key code {}", keys.primary);
        }

        listeners
    }

    async fn read_keys(self, mut events: evdev::EventStream, keys: KeyConfig, name: String) {
        loop {
            match events.next_event().await {
                Ok(event) if event.event_type() == EventType::KEY => {
                    if let Some(button) = decode_key(event.code(), event.value(), &keys) {
                        self.dispatch(button);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("key listener on {name} stopped: {e}");
                    return;
                }
            }
        }
    }

    /// Follows the remote button stream, reconnecting after failures.
    pub fn spawn_remote(&self, config: ButtonsServerConfig) {
        let dispatcher = self.clone();

        tokio::spawn(async move {
            loop {
                if let Err(e) = dispatcher.read_remote(&config).await {
                    warn!("buttons server {}: {e:#}", config.address);
                }
                tokio::time::sleep(Self::RECONNECT_DELAY).await;
            }
        });
    }

    async fn read_remote(&self, config: &ButtonsServerConfig) -> Result<()> {
        let endpoint = Endpoint::parse(&config.address);
        let mut socket = SubSocket::new();
        socket
            .connect(endpoint.as_str())
            .await
            .context("failed to connect")?;
        socket.subscribe("").await.context("failed to subscribe")?;
        info!("reading buttons from {endpoint}");

        loop {
            let message = socket.recv().await.context("failed to read event")?;
            let event = message
                .get(0)
                .map(|part| String::from_utf8_lossy(part).trim().to_string())
                .unwrap_or_default();

            match event.parse::<i32>() {
                Ok(value) => {
                    if let Some(button) = decode_remote(value, config) {
                        self.dispatch(button);
                    }
                }
                Err(_) => warn!("ignoring malformed button event {event:?}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeromq::{PubSocket, SocketSend, ZmqMessage};

    fn buttons(direction: i32) -> ButtonsServerConfig {
        ButtonsServerConfig {
            address: String::new(),
            direction,
            button_a: 17,
            button_b: 27,
        }
    }

    mod keys {
        use super::*;

        #[test]
        fn release_fires() {
            let keys = KeyConfig::default();
            assert_eq!(decode_key(30, 0, &keys), Some(Button::Primary));
            assert_eq!(decode_key(31, 0, &keys), Some(Button::Secondary));
        }

        #[test]
        fn press_and_repeat_are_ignored() {
            let keys = KeyConfig::default();
            assert_eq!(decode_key(30, 1, &keys), None);
            assert_eq!(decode_key(30, 2, &keys), None);
        }

        #[test]
        fn other_keys_are_ignored() {
            assert_eq!(decode_key(57, 0, &KeyConfig::default()), None);
        }
    }

    mod remote {
        use super::*;

        #[test]
        fn positive_polarity() {
            let config = buttons(1);
            assert_eq!(decode_remote(17, &config), Some(Button::Primary));
            assert_eq!(decode_remote(27, &config), Some(Button::Secondary));
            assert_eq!(decode_remote(-17, &config), None);
            assert_eq!(decode_remote(-27, &config), None);
        }

        #[test]
        fn negative_polarity() {
            let config = buttons(-1);
            assert_eq!(decode_remote(-17, &config), Some(Button::Primary));
            assert_eq!(decode_remote(-27, &config), Some(Button::Secondary));
            assert_eq!(decode_remote(17, &config), None);
        }

        #[test]
        fn unknown_codes_are_ignored() {
            assert_eq!(decode_remote(5, &buttons(1)), None);
            assert_eq!(decode_remote(i32::MIN, &buttons(-1)), None);
        }

        #[tokio::test]
        async fn published_events_feed_dispatcher() {
            let mut publisher = PubSocket::new();
            let bound = publisher.bind("tcp://127.0.0.1:0").await.unwrap();
            let mut config = buttons(1);
            config.address = bound.to_string();

            let (dispatcher, mut rx) = InputDispatcher::new();
            dispatcher.spawn_remote(config);

            // subscribers only see messages sent after they joined
            let events = tokio::spawn(async move {
                loop {
                    for event in ["17", "-17", "noise", "27"] {
                        publisher
                            .send(ZmqMessage::from(event.to_string()))
                            .await
                            .unwrap();
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            });

            let mut seen = Vec::new();
            while !(seen.contains(&Button::Primary) && seen.contains(&Button::Secondary)) {
                let button = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                    .await
                    .expect("no button received")
                    .unwrap();
                seen.push(button);
            }

            events.abort();
        }
    }
}
