//! Hierarchical menu with paginated options and a trailing back entry.

use super::{View, overlay::MessageOverlay, wifi::WifiMenu};
use crate::network_client::NetworkControl;
use log::{debug, error, info};
use std::{collections::BTreeMap, time::Instant};

/// Result of a primary press as seen by the parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Press {
    Stay,
    Exited,
}

/// Synchronous effect of a leaf option.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafAction {
    Restart,
}

#[derive(Clone, Debug)]
struct MenuEntry {
    label: String,
    action: Option<LeafAction>,
}

enum Options {
    Fixed(Vec<MenuEntry>),
    Wifi(WifiMenu),
}

pub struct MenuNode {
    options: Options,
    page_size: usize,
    highlighted: usize,
    active_child: Option<usize>,
    children: BTreeMap<usize, MenuNode>,
    overlay: MessageOverlay,
}

impl MenuNode {
    pub const BACK_LABEL: &str = "back";

    /// An empty node with a back entry.
    pub fn new(page_size: usize) -> Self {
        Self::with_options(Options::Fixed(Vec::new()), page_size)
    }

    /// Node listing saved Wi-Fi profiles.
    pub fn wifi(page_size: usize) -> Self {
        Self::with_options(Options::Wifi(WifiMenu::new()), page_size)
    }

    fn with_options(options: Options, page_size: usize) -> Self {
        Self {
            options,
            page_size: page_size.max(1),
            highlighted: 0,
            active_child: None,
            children: BTreeMap::new(),
            overlay: MessageOverlay::new(),
        }
    }

    /// Appends an option that opens `child` when selected.
    pub fn submenu(mut self, label: impl Into<String>, child: MenuNode) -> Self {
        if let Some(index) = self.push_entry(label.into(), None) {
            self.children.insert(index, child);
        }
        self
    }

    /// Appends an option that runs `action` when selected.
    pub fn action(mut self, label: impl Into<String>, action: LeafAction) -> Self {
        self.push_entry(label.into(), Some(action));
        self
    }

    fn push_entry(&mut self, label: String, action: Option<LeafAction>) -> Option<usize> {
        match &mut self.options {
            Options::Fixed(entries) => {
                entries.push(MenuEntry { label, action });
                Some(entries.len() - 1)
            }
            Options::Wifi(_) => {
                error!("static option {label:?} ignored on dynamic node");
                None
            }
        }
    }

    /// Current option labels, back entry last.
    pub fn labels(&self) -> Vec<String> {
        let mut labels = match &self.options {
            Options::Fixed(entries) => entries.iter().map(|entry| entry.label.clone()).collect(),
            Options::Wifi(wifi) => wifi.labels(),
        };

        labels.push(Self::BACK_LABEL.to_string());
        labels
    }

    #[cfg(test)]
    pub(crate) fn highlighted(&self) -> usize {
        self.highlighted
    }

    #[cfg(test)]
    pub(crate) fn has_active_child(&self) -> bool {
        self.active_child.is_some()
    }

    #[cfg(test)]
    pub(crate) fn wifi_menu(&self) -> Option<&WifiMenu> {
        match &self.options {
            Options::Wifi(wifi) => Some(wifi),
            Options::Fixed(_) => None,
        }
    }

    pub fn press_primary<C>(&mut self, client: &C, now: Instant) -> Press
    where
        C: NetworkControl + Clone + Send + Sync + 'static,
    {
        if self.input_blocked(now) {
            debug!("primary press swallowed by overlay");
            return Press::Stay;
        }

        if let Some(index) = self.active_child {
            match self.children.get_mut(&index) {
                Some(child) => {
                    if child.press_primary(client, now) == Press::Exited {
                        self.active_child = None;
                    }
                }
                None => self.active_child = None,
            }
            return Press::Stay;
        }

        let count = self.labels().len();
        self.revalidate(count);

        if self.highlighted + 1 == count {
            self.highlighted = 0;
            return Press::Exited;
        }

        let index = self.highlighted;
        if self.children.contains_key(&index) {
            debug!("entering submenu {index}");
            self.active_child = Some(index);
            return Press::Stay;
        }

        match &mut self.options {
            Options::Fixed(entries) => {
                if let Some(action) = entries.get(index).and_then(|entry| entry.action) {
                    run_action(action, client);
                }
            }
            Options::Wifi(wifi) => wifi.select(index, client, &mut self.overlay, now),
        }

        Press::Stay
    }

    pub fn press_secondary(&mut self, now: Instant) {
        if self.input_blocked(now) {
            debug!("secondary press swallowed by overlay");
            return;
        }

        if let Some(index) = self.active_child {
            match self.children.get_mut(&index) {
                Some(child) => child.press_secondary(now),
                None => self.active_child = None,
            }
            return;
        }

        let count = self.labels().len();
        if count == 0 {
            return;
        }
        self.revalidate(count);
        self.highlighted = (self.highlighted + 1) % count;
    }

    /// Produces the text of the deepest active node.
    pub fn view<C>(&mut self, client: &C, now: Instant) -> View
    where
        C: NetworkControl + Clone + Send + Sync + 'static,
    {
        if let Some(index) = self.active_child {
            if let Some(child) = self.children.get_mut(&index) {
                return child.view(client, now);
            }
            self.active_child = None;
        }

        if let Options::Wifi(wifi) = &mut self.options {
            wifi.on_render(client, &mut self.overlay, now);
        }

        if self.overlay.is_active(now) {
            return View::text(self.overlay.lines().iter().cloned());
        }

        let labels = self.labels();
        self.revalidate(labels.len());

        let start = self.highlighted / self.page_size * self.page_size;
        View::text(
            labels
                .iter()
                .enumerate()
                .skip(start)
                .take(self.page_size)
                .map(|(index, label)| {
                    let cursor = if index == self.highlighted { "> " } else { "  " };
                    format!("{cursor}{label}")
                }),
        )
    }

    /// Dynamic nodes apply pending completions first and ignore input while
    /// their overlay is up.
    fn input_blocked(&mut self, now: Instant) -> bool {
        match &mut self.options {
            Options::Wifi(wifi) => {
                wifi.poll(&mut self.overlay, now);
                self.overlay.is_active(now)
            }
            Options::Fixed(_) => false,
        }
    }

    fn revalidate(&mut self, count: usize) {
        if self.highlighted >= count {
            debug!("highlight {} out of range {count}, reset", self.highlighted);
            self.highlighted = 0;
        }
    }
}

fn run_action<C>(action: LeafAction, client: &C)
where
    C: NetworkControl + Clone + Send + Sync + 'static,
{
    match action {
        LeafAction::Restart => {
            info!("restart selected");
            let client = client.clone();
            tokio::spawn(async move {
                if let Err(e) = client.restart().await {
                    error!("failed to restart: {e:#}");
                }
            });
        }
    }
}

/// The top level menu reached from the status pages.
pub fn root_menu(page_size: usize) -> MenuNode {
    let reboot = MenuNode::new(page_size).action("yes, reboot", LeafAction::Restart);

    MenuNode::new(page_size)
        .submenu("wifi", MenuNode::wifi(page_size))
        .submenu("reboot", reboot)
}
