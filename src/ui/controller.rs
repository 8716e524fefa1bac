//! Top level navigation and frame cadence.

use super::{Button, View, menu::MenuNode, menu::Press, status_view::StatusView};
use crate::{
    network_client::NetworkControl,
    render::{Bitmap, Renderer},
    status::StatusStore,
    transport::OutputTransport,
};
use log::debug;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiState {
    Initializing,
    Status,
    Menu,
}

pub struct Controller<C> {
    client: C,
    store: StatusStore,
    renderer: Renderer,
    transport: Arc<dyn OutputTransport>,
    status_view: StatusView,
    root: MenuNode,
    state: UiState,
    refresh_interval: Duration,
    push_interval: Duration,
    last_render: Option<Instant>,
    last_push: Option<Instant>,
    frame: Bitmap,
}

impl<C> Controller<C>
where
    C: NetworkControl + Clone + Send + Sync + 'static,
{
    pub const INITIALIZING: &str = "Initializing...";
    const CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn new(
        client: C,
        store: StatusStore,
        renderer: Renderer,
        transport: Arc<dyn OutputTransport>,
        root: MenuNode,
        refresh_interval: Duration,
        push_interval: Duration,
    ) -> Self {
        let frame = renderer.blank();
        let status_view = StatusView::new(renderer.rows());
        Self {
            client,
            store,
            renderer,
            transport,
            status_view,
            root,
            state: UiState::Initializing,
            refresh_interval,
            push_interval,
            last_render: None,
            last_push: None,
            frame,
        }
    }

    pub fn state(&self) -> UiState {
        self.state
    }

    /// Latest rendered frame.
    #[cfg(test)]
    pub(crate) fn frame(&self) -> &Bitmap {
        &self.frame
    }

    /// Leaves the initializing screen once transports and listeners run.
    pub fn mark_ready(&mut self) {
        if self.state == UiState::Initializing {
            debug!("ui: Initializing -> Status");
            self.state = UiState::Status;
            self.force_refresh();
        }
    }

    pub fn press(&mut self, button: Button, now: Instant) {
        debug!("ui: {button:?} pressed in {:?}", self.state);

        match (self.state, button) {
            (UiState::Initializing, _) => return,
            (UiState::Status, Button::Primary) => self.status_view.press_primary(),
            (UiState::Status, Button::Secondary) => {
                debug!("ui: Status -> Menu");
                self.state = UiState::Menu;
            }
            (UiState::Menu, Button::Primary) => {
                if self.root.press_primary(&self.client, now) == Press::Exited {
                    debug!("ui: Menu -> Status");
                    self.state = UiState::Status;
                }
            }
            (UiState::Menu, Button::Secondary) => self.root.press_secondary(now),
        }

        self.force_refresh();
    }

    /// Renders a new frame if the refresh interval has elapsed.
    pub fn render(&mut self, now: Instant) -> bool {
        if !Self::due(self.last_render, self.refresh_interval, now) {
            return false;
        }

        let view = self.view(now);
        self.frame = self.renderer.render(&view);
        self.last_render = Some(now);
        true
    }

    /// One control loop step: render on the refresh cadence and publish on
    /// the push cadence.
    pub fn tick(&mut self, now: Instant) {
        let rendered = self.render(now);

        if (rendered && self.transport.publish_every_frame())
            || Self::due(self.last_push, self.push_interval, now)
        {
            self.transport.publish(&self.frame);
            self.last_push = Some(now);
        }
    }

    fn view(&mut self, now: Instant) -> View {
        match self.state {
            UiState::Initializing => View::text([Self::INITIALIZING]),
            UiState::Status => {
                let clock = chrono::Local::now().format(Self::CLOCK_FORMAT).to_string();
                self.status_view.view(self.store.current().as_deref(), &clock)
            }
            UiState::Menu => self.root.view(&self.client, now),
        }
    }

    fn force_refresh(&mut self) {
        self.last_render = None;
        self.last_push = None;
    }

    fn due(last: Option<Instant>, interval: Duration, now: Instant) -> bool {
        last.is_none_or(|last| now.saturating_duration_since(last) >= interval)
    }
}
