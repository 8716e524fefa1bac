//! Status snapshot shared between the pollers and the UI.
//!
//! A [`StatusSnapshot`] is never mutated once published. Pollers build a new
//! value from the previous one and swap it into the [`StatusStore`] as a whole,
//! so readers always observe one complete snapshot.

use chrono::{DateTime, Local};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::watch;

/// IPv4 column of the interface table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ipv4Status {
    /// `address/prefix`
    Address(String),
    /// interface not activated or without address, shown as `-`
    Absent,
    /// reading the address failed, shown as `E`
    Error,
}

impl std::fmt::Display for Ipv4Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ipv4Status::Address(addr) => write!(f, "{addr}"),
            Ipv4Status::Absent => write!(f, "-"),
            Ipv4Status::Error => write!(f, "E"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceStatus {
    pub name: String,
    pub kind: String,
    pub state: String,
    pub ipv4: Ipv4Status,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WifiSignal {
    Associated { ssid: String, strength: i32 },
    Unknown,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WifiStatus {
    pub interface: String,
    pub signal: WifiSignal,
}

/// Field group written by the interface poller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceReport {
    pub table: BTreeMap<String, InterfaceStatus>,
    /// first activated Wi-Fi interface, if any
    pub wifi: Option<WifiStatus>,
}

/// Immutable view of the network health. `None` fields have not been
/// reported by their poller yet.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub interfaces: Option<InterfaceReport>,
    pub dns: Option<bool>,
    pub wan: Option<String>,
    pub updated_at: DateTime<Local>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            interfaces: None,
            dns: None,
            wan: None,
            updated_at: Local::now(),
        }
    }
}

impl StatusSnapshot {
    pub fn with_interfaces(&self, report: InterfaceReport) -> Self {
        Self {
            interfaces: Some(report),
            updated_at: Local::now(),
            ..self.clone()
        }
    }

    pub fn with_dns(&self, reachable: bool) -> Self {
        Self {
            dns: Some(reachable),
            updated_at: Local::now(),
            ..self.clone()
        }
    }

    pub fn with_wan(&self, wan: String) -> Self {
        Self {
            wan: Some(wan),
            updated_at: Local::now(),
            ..self.clone()
        }
    }
}

/// Handle to the latest snapshot. Cloning the store yields another handle to
/// the same cell.
#[derive(Clone, Debug)]
pub struct StatusStore {
    tx: Arc<watch::Sender<Option<Arc<StatusSnapshot>>>>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Publishes `snapshot` as the visible value.
    pub fn replace(&self, snapshot: StatusSnapshot) {
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }

    /// Derives a new snapshot from the current one and publishes it.
    ///
    /// The read and the swap happen under the store's write lock, so two
    /// pollers updating different field groups never lose each other's
    /// writes.
    pub fn update<F>(&self, derive: F)
    where
        F: FnOnce(&StatusSnapshot) -> StatusSnapshot,
    {
        self.tx.send_modify(|current| {
            let next = match current.as_deref() {
                Some(previous) => derive(previous),
                None => derive(&StatusSnapshot::default()),
            };
            *current = Some(Arc::new(next));
        });
    }

    /// Latest snapshot, or `None` before the first write.
    pub fn current(&self) -> Option<Arc<StatusSnapshot>> {
        self.tx.borrow().clone()
    }
}
