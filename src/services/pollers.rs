//! Background producers of the status snapshot.

use crate::{network_client::NetworkProbe, status::StatusStore};
use log::{debug, error, warn};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Marker published when the WAN probe fails.
pub const WAN_ERROR: &str = "-error-";

/// The interface, DNS and WAN pollers. Each one owns a field group of the
/// snapshot and refreshes it once per period.
#[derive(Clone)]
pub struct StatusPollers<P> {
    probe: P,
    store: StatusStore,
    period: Duration,
    check_dns: String,
}

impl<P> StatusPollers<P>
where
    P: NetworkProbe + Clone + Send + Sync + 'static,
{
    pub fn new(probe: P, store: StatusStore, period: Duration, check_dns: String) -> Self {
        Self {
            probe,
            store,
            period,
            check_dns,
        }
    }

    /// Runs every poller in its own task.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let interfaces = self.clone();
        let dns = self.clone();
        let wan = self;

        vec![
            tokio::spawn(async move {
                loop {
                    interfaces.poll_interfaces().await;
                    tokio::time::sleep(interfaces.period).await;
                }
            }),
            tokio::spawn(async move {
                loop {
                    dns.poll_dns().await;
                    tokio::time::sleep(dns.period).await;
                }
            }),
            tokio::spawn(async move {
                loop {
                    wan.poll_wan().await;
                    tokio::time::sleep(wan.period).await;
                }
            }),
        ]
    }

    /// A failed listing keeps the previous table.
    pub async fn poll_interfaces(&self) {
        match self.probe.interfaces().await {
            Ok(report) => {
                debug!("interfaces: {:?}", report.table.keys().collect::<Vec<_>>());
                self.store.update(|snapshot| snapshot.with_interfaces(report));
            }
            Err(e) => error!("failed to read interfaces: {e:#}"),
        }
    }

    pub async fn poll_dns(&self) {
        let reachable = self.probe.dns_reachable(self.check_dns.clone()).await;
        debug!("dns reachable: {reachable}");
        self.store.update(|snapshot| snapshot.with_dns(reachable));
    }

    /// Uses the DNS result of the current snapshot to pick the probe.
    pub async fn poll_wan(&self) {
        let dns = self
            .store
            .current()
            .and_then(|snapshot| snapshot.dns)
            .unwrap_or(false);

        let wan = match self.probe.wan_status(dns).await {
            Ok(wan) => wan,
            Err(e) => {
                warn!("failed to check wan: {e:#}");
                WAN_ERROR.to_string()
            }
        };

        debug!("wan: {wan}");
        self.store.update(|snapshot| snapshot.with_wan(wan));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{InterfaceReport, InterfaceStatus, Ipv4Status};
    use anyhow::{Result, anyhow};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeProbe {
        interfaces_fail: bool,
        dns: bool,
        wan: Option<String>,
        wan_requests: Arc<Mutex<Vec<bool>>>,
    }

    impl NetworkProbe for FakeProbe {
        async fn interfaces(&self) -> Result<InterfaceReport> {
            if self.interfaces_fail {
                return Err(anyhow!("nmcli missing"));
            }

            let mut report = InterfaceReport::default();
            report.table.insert(
                "eth0".to_string(),
                InterfaceStatus {
                    name: "eth0".to_string(),
                    kind: "ethernet".to_string(),
                    state: "connected".to_string(),
                    ipv4: Ipv4Status::Address("10.0.0.2/24".to_string()),
                },
            );
            Ok(report)
        }

        async fn dns_reachable(&self, hostname: String) -> bool {
            assert_eq!(hostname, "example.org");
            self.dns
        }

        async fn wan_status(&self, dns_reachable: bool) -> Result<String> {
            self.wan_requests.lock().unwrap().push(dns_reachable);
            self.wan.clone().ok_or_else(|| anyhow!("timeout"))
        }
    }

    fn pollers(probe: FakeProbe) -> (StatusPollers<FakeProbe>, StatusStore) {
        let store = StatusStore::new();
        let pollers = StatusPollers::new(
            probe,
            store.clone(),
            Duration::from_secs(1),
            "example.org".to_string(),
        );
        (pollers, store)
    }

    #[tokio::test]
    async fn interfaces_are_published() {
        let (pollers, store) = pollers(FakeProbe::default());
        pollers.poll_interfaces().await;

        let snapshot = store.current().unwrap();
        let report = snapshot.interfaces.as_ref().unwrap();
        assert_eq!(
            report.table["eth0"].ipv4,
            Ipv4Status::Address("10.0.0.2/24".to_string())
        );
        assert_eq!(snapshot.dns, None);
    }

    #[tokio::test]
    async fn failed_interface_read_keeps_previous_table() {
        let (pollers, store) = pollers(FakeProbe::default());
        pollers.poll_interfaces().await;

        let failing = StatusPollers {
            probe: FakeProbe {
                interfaces_fail: true,
                ..Default::default()
            },
            ..pollers
        };
        failing.poll_interfaces().await;

        assert!(store.current().unwrap().interfaces.is_some());
    }

    #[tokio::test]
    async fn wan_probe_follows_dns() {
        let probe = FakeProbe {
            dns: true,
            wan: Some("1.2.3.4".to_string()),
            ..Default::default()
        };
        let requests = probe.wan_requests.clone();
        let (pollers, store) = pollers(probe);

        pollers.poll_wan().await;
        pollers.poll_dns().await;
        pollers.poll_wan().await;

        assert_eq!(*requests.lock().unwrap(), [false, true]);
        let snapshot = store.current().unwrap();
        assert_eq!(snapshot.dns, Some(true));
        assert_eq!(snapshot.wan.as_deref(), Some("1.2.3.4"));
    }

    #[tokio::test]
    async fn wan_failure_is_marked() {
        let (pollers, store) = pollers(FakeProbe::default());
        pollers.poll_wan().await;

        assert_eq!(store.current().unwrap().wan.as_deref(), Some(WAN_ERROR));
    }
}
