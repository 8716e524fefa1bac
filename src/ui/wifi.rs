//! Wi-Fi profile selection.
//!
//! The option list is fetched in the background the first time the node is
//! shown. Background tasks report back through a completion channel that is
//! drained from the control loop, so the node state is only ever touched by
//! its owner.

use super::overlay::MessageOverlay;
use crate::network_client::{ConnectOutcome, NetworkControl, Profile};
use anyhow::{Result, anyhow};
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use std::{
    panic::AssertUnwindSafe,
    time::{Duration, Instant},
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WifiState {
    Idle,
    Refreshing,
    Populated,
    Connecting,
}

#[derive(Debug)]
enum Completion {
    Profiles(Result<Vec<Profile>>),
    Connect(Result<ConnectOutcome>),
}

pub struct WifiMenu {
    state: WifiState,
    profiles: Vec<Profile>,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
}

impl Default for WifiMenu {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiMenu {
    pub const REFRESH_LABEL: &str = "refresh";

    const PENDING_TIMEOUT: Duration = Duration::from_secs(60);
    const SHORT_TIMEOUT: Duration = Duration::from_secs(3);
    const LONG_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: WifiState::Idle,
            profiles: Vec::new(),
            tx,
            rx,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// Profile names followed by the trailing refresh action.
    pub fn labels(&self) -> Vec<String> {
        self.profiles
            .iter()
            .map(|profile| profile.name.clone())
            .chain(std::iter::once(Self::REFRESH_LABEL.to_string()))
            .collect()
    }

    /// Called whenever the node is about to be drawn.
    pub fn on_render<C>(&mut self, client: &C, overlay: &mut MessageOverlay, now: Instant)
    where
        C: NetworkControl + Clone + Send + Sync + 'static,
    {
        self.poll(overlay, now);

        if self.state == WifiState::Idle {
            self.refresh(client, overlay, now);
        }
    }

    /// Applies every completion reported by finished background tasks.
    pub fn poll(&mut self, overlay: &mut MessageOverlay, now: Instant) {
        while let Ok(completion) = self.rx.try_recv() {
            self.complete(completion, overlay, now);
        }
    }

    /// Runs the option at `index`: a profile connects, the trailing entry
    /// refreshes the list.
    pub fn select<C>(&mut self, index: usize, client: &C, overlay: &mut MessageOverlay, now: Instant)
    where
        C: NetworkControl + Clone + Send + Sync + 'static,
    {
        if matches!(self.state, WifiState::Refreshing | WifiState::Connecting) {
            info!("wifi action rejected: {:?} already in progress", self.state);
            return;
        }

        if index == self.profiles.len() {
            self.refresh(client, overlay, now);
        } else if let Some(profile) = self.profiles.get(index).cloned() {
            self.connect(profile, client, overlay, now);
        }
    }

    fn refresh<C>(&mut self, client: &C, overlay: &mut MessageOverlay, now: Instant)
    where
        C: NetworkControl + Clone + Send + Sync + 'static,
    {
        debug!("wifi: {:?} -> Refreshing", self.state);
        self.state = WifiState::Refreshing;
        overlay.show(["loading..."], Self::PENDING_TIMEOUT, now);

        let client = client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = AssertUnwindSafe(async { client.list_profiles().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(anyhow!("profile listing panicked")));

            if let Err(e) = &result {
                error!("failed to list wifi profiles: {e:#}");
            }

            // receiver only goes away together with the menu
            let _ = tx.send(Completion::Profiles(result));
        });
    }

    fn connect<C>(&mut self, profile: Profile, client: &C, overlay: &mut MessageOverlay, now: Instant)
    where
        C: NetworkControl + Clone + Send + Sync + 'static,
    {
        info!("wifi: connecting to {}", profile.name);
        self.state = WifiState::Connecting;
        overlay.show(["connecting..."], Self::PENDING_TIMEOUT, now);

        let client = client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = AssertUnwindSafe(async { client.connect(profile.handle).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(anyhow!("connect panicked")));

            if let Err(e) = &result {
                error!("failed to connect wifi: {e:#}");
            }

            let _ = tx.send(Completion::Connect(result));
        });
    }

    fn complete(&mut self, completion: Completion, overlay: &mut MessageOverlay, now: Instant) {
        match completion {
            Completion::Profiles(Ok(profiles)) => {
                info!("wifi: {} profiles available", profiles.len());
                self.profiles = profiles;
                overlay.clear();
            }
            Completion::Profiles(Err(_)) => {
                self.profiles.clear();
                overlay.show(["error!"], Self::SHORT_TIMEOUT, now);
            }
            Completion::Connect(Ok(outcome)) => {
                let (text, timeout) = match outcome {
                    ConnectOutcome::DeviceUnavailable => ("error: wifi disabled", Self::LONG_TIMEOUT),
                    ConnectOutcome::AlreadyConnected => ("already connected!", Self::LONG_TIMEOUT),
                    ConnectOutcome::Connected => ("connected!", Self::SHORT_TIMEOUT),
                    ConnectOutcome::Failed => ("error!", Self::SHORT_TIMEOUT),
                };
                if outcome != ConnectOutcome::Connected {
                    warn!("wifi: connect finished with {outcome:?}");
                }
                overlay.show([text], timeout, now);
            }
            Completion::Connect(Err(_)) => {
                overlay.show(["error!"], Self::SHORT_TIMEOUT, now);
            }
        }

        debug!("wifi: {:?} -> Populated", self.state);
        self.state = WifiState::Populated;
    }

    /// Waits for the next background completion and applies it.
    #[cfg(test)]
    pub(crate) async fn wait_for_completion(&mut self, overlay: &mut MessageOverlay, now: Instant) {
        if let Some(completion) = self.rx.recv().await {
            self.complete(completion, overlay, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::testing::{FakeNetwork, profiles};

    #[tokio::test]
    async fn first_render_loads_profiles() {
        let client = FakeNetwork::with_profiles(profiles(&["A", "B"]));
        let mut wifi = WifiMenu::new();
        let mut overlay = MessageOverlay::new();
        let now = Instant::now();

        assert_eq!(wifi.state(), WifiState::Idle);
        wifi.on_render(&client, &mut overlay, now);
        assert_eq!(wifi.state(), WifiState::Refreshing);
        assert!(overlay.is_active(now));
        assert_eq!(overlay.lines(), ["loading..."]);

        wifi.wait_for_completion(&mut overlay, now).await;

        assert_eq!(wifi.state(), WifiState::Populated);
        assert!(!overlay.is_active(now));
        assert_eq!(wifi.labels(), ["A", "B", "refresh"]);
    }

    #[tokio::test]
    async fn failed_listing_leaves_only_refresh() {
        let client = FakeNetwork::failing_profiles();
        let mut wifi = WifiMenu::new();
        let mut overlay = MessageOverlay::new();
        let now = Instant::now();

        wifi.on_render(&client, &mut overlay, now);
        wifi.wait_for_completion(&mut overlay, now).await;

        assert_eq!(wifi.state(), WifiState::Populated);
        assert_eq!(wifi.labels(), ["refresh"]);
        assert_eq!(overlay.lines(), ["error!"]);
        assert!(overlay.is_active(now + Duration::from_millis(2900)));
        assert!(!overlay.is_active(now + Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn refresh_is_rejected_while_in_flight() {
        let client = FakeNetwork::with_profiles(profiles(&["A"]));
        let mut wifi = WifiMenu::new();
        let mut overlay = MessageOverlay::new();
        let now = Instant::now();

        wifi.on_render(&client, &mut overlay, now);
        // trailing refresh while still refreshing
        wifi.select(0, &client, &mut overlay, now);
        wifi.wait_for_completion(&mut overlay, now).await;

        assert_eq!(client.profile_requests(), 1);
        assert_eq!(wifi.state(), WifiState::Populated);
    }

    #[tokio::test]
    async fn selecting_refresh_reloads() {
        let client = FakeNetwork::with_profiles(profiles(&["A"]));
        let mut wifi = WifiMenu::new();
        let mut overlay = MessageOverlay::new();
        let now = Instant::now();

        wifi.on_render(&client, &mut overlay, now);
        wifi.wait_for_completion(&mut overlay, now).await;

        client.set_profiles(profiles(&["A", "C"]));
        wifi.select(1, &client, &mut overlay, now);
        assert_eq!(wifi.state(), WifiState::Refreshing);
        wifi.wait_for_completion(&mut overlay, now).await;

        assert_eq!(client.profile_requests(), 2);
        assert_eq!(wifi.labels(), ["A", "C", "refresh"]);
    }

    #[tokio::test]
    async fn connect_outcomes_map_to_messages() {
        let cases = [
            (ConnectOutcome::Connected, "connected!", 3),
            (ConnectOutcome::AlreadyConnected, "already connected!", 5),
            (ConnectOutcome::DeviceUnavailable, "error: wifi disabled", 5),
            (ConnectOutcome::Failed, "error!", 3),
        ];

        for (outcome, text, secs) in cases {
            let client = FakeNetwork::with_profiles(profiles(&["home"]));
            client.set_outcome(outcome);
            let mut wifi = WifiMenu::new();
            let mut overlay = MessageOverlay::new();
            let now = Instant::now();

            wifi.on_render(&client, &mut overlay, now);
            wifi.wait_for_completion(&mut overlay, now).await;

            wifi.select(0, &client, &mut overlay, now);
            assert_eq!(wifi.state(), WifiState::Connecting);
            assert_eq!(overlay.lines(), ["connecting..."]);

            wifi.wait_for_completion(&mut overlay, now).await;

            assert_eq!(wifi.state(), WifiState::Populated, "{outcome:?}");
            assert_eq!(overlay.lines(), [text]);
            let timeout = Duration::from_secs(secs);
            assert!(overlay.is_active(now + timeout - Duration::from_millis(1)));
            assert!(!overlay.is_active(now + timeout));
            assert_eq!(client.connects(), ["home"]);
        }
    }

    #[tokio::test]
    async fn connect_error_shows_generic_message() {
        let client = FakeNetwork::with_profiles(profiles(&["home"]));
        client.fail_connect();
        let mut wifi = WifiMenu::new();
        let mut overlay = MessageOverlay::new();
        let now = Instant::now();

        wifi.on_render(&client, &mut overlay, now);
        wifi.wait_for_completion(&mut overlay, now).await;
        wifi.select(0, &client, &mut overlay, now);
        wifi.wait_for_completion(&mut overlay, now).await;

        assert_eq!(wifi.state(), WifiState::Populated);
        assert_eq!(overlay.lines(), ["error!"]);
    }
}
