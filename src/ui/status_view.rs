use super::{SignalLevel, View};
use crate::status::{StatusSnapshot, WifiSignal};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusPage {
    #[default]
    Overview,
    Interfaces,
}

/// Read-only pages over the latest status snapshot.
#[derive(Debug)]
pub struct StatusView {
    page: StatusPage,
    rows: usize,
}

impl StatusView {
    /// `rows` is the number of text lines that fit on the display.
    pub fn new(rows: usize) -> Self {
        Self {
            page: StatusPage::default(),
            rows: rows.max(1),
        }
    }

    pub fn page(&self) -> StatusPage {
        self.page
    }

    /// Cycles to the next page.
    pub fn press_primary(&mut self) {
        self.page = match self.page {
            StatusPage::Overview => StatusPage::Interfaces,
            StatusPage::Interfaces => StatusPage::Overview,
        };
    }

    pub fn view(&self, snapshot: Option<&StatusSnapshot>, clock: &str) -> View {
        match self.page {
            StatusPage::Overview => overview(snapshot, clock),
            StatusPage::Interfaces => interfaces(snapshot, self.rows),
        }
    }
}

fn overview(snapshot: Option<&StatusSnapshot>, clock: &str) -> View {
    let wifi = snapshot
        .and_then(|snapshot| snapshot.interfaces.as_ref())
        .and_then(|report| report.wifi.as_ref())
        .map(|wifi| &wifi.signal);

    let (wifi_line, signal) = match wifi {
        None => ("wifi: -".to_string(), None),
        Some(WifiSignal::Associated { ssid, strength }) => (
            format!("wifi: {ssid}"),
            Some(SignalLevel::from_strength(*strength)),
        ),
        Some(WifiSignal::Unknown) => ("wifi: unknown".to_string(), None),
        Some(WifiSignal::Error) => ("wifi: error".to_string(), None),
    };

    let dns = match snapshot.and_then(|snapshot| snapshot.dns) {
        Some(true) => "online",
        _ => "offline",
    };

    let wan = snapshot
        .and_then(|snapshot| snapshot.wan.as_deref())
        .filter(|wan| !wan.is_empty())
        .unwrap_or("offline");

    View {
        lines: vec![
            wifi_line,
            format!("dns: {dns}"),
            format!("wan: {wan}"),
            clock.to_string(),
        ],
        signal,
    }
}

fn interfaces(snapshot: Option<&StatusSnapshot>, rows: usize) -> View {
    let mut lines: Vec<String> = snapshot
        .and_then(|snapshot| snapshot.interfaces.as_ref())
        .map(|report| {
            report
                .table
                .values()
                .map(|interface| format!("{}: {}", interface.name, interface.ipv4))
                .collect()
        })
        .unwrap_or_default();

    if lines.is_empty() {
        return View::text(["page 2"]);
    }

    // the last row counts what does not fit
    if lines.len() > rows {
        let shown = rows - 1;
        let hidden = lines.len() - shown;
        lines.truncate(shown);
        lines.push(format!("+{hidden} more"));
    }

    View::text(lines)
}
