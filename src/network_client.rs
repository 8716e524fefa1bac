#![cfg_attr(feature = "mock", allow(dead_code, unused_imports))]

use crate::{
    config::AppConfig,
    http_client::{handle_http_response, probe_client},
    status::{InterfaceReport, InterfaceStatus, Ipv4Status, WifiSignal, WifiStatus},
};
use anyhow::{Context, Result, bail, ensure};
use log::{debug, info, warn};
#[cfg(feature = "mock")]
use mockall::automock;
use reqwest::Client;
use std::{path::PathBuf, time::Duration};
use tokio::process::Command;
use trait_variant::make;

/// A saved Wi-Fi connection the operator can select.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    /// opaque identifier handed back to [`NetworkControl::connect`]
    pub handle: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AlreadyConnected,
    DeviceUnavailable,
    Failed,
}

/// Privileged actions and profile listing requested by the menu.
#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait NetworkControl {
    async fn list_profiles(&self) -> Result<Vec<Profile>>;
    async fn connect(&self, handle: String) -> Result<ConnectOutcome>;
    async fn restart(&self) -> Result<()>;
}

/// Facts consumed by the status pollers.
#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait NetworkProbe {
    async fn interfaces(&self) -> Result<InterfaceReport>;
    async fn dns_reachable(&self, hostname: String) -> bool;
    async fn wan_status(&self, dns_reachable: bool) -> Result<String>;
}

/// NetworkManager backed implementation talking to `nmcli`.
#[derive(Clone)]
pub struct NetworkClient {
    http: Client,
    interfaces: Option<Vec<String>>,
    connect_helper: PathBuf,
    reboot_command: Vec<String>,
    wan_ip_url: String,
    wan_fallback_url: String,
}

#[derive(Debug, PartialEq, Eq)]
struct Device {
    name: String,
    kind: String,
    state: String,
}

impl NetworkClient {
    const NMCLI: &str = "nmcli";
    const WIFI_CONNECTION_TYPE: &str = "802-11-wireless";
    const WIFI_DEVICE_TYPE: &str = "wifi";
    const ACTIVATED_STATE: &str = "connected";
    const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            http: probe_client(Self::PROBE_TIMEOUT)?,
            interfaces: config.interfaces.clone(),
            connect_helper: config.wifi_connect_helper.clone(),
            reboot_command: config.reboot_command.clone(),
            wan_ip_url: config.wan_ip_url.clone(),
            wan_fallback_url: config.wan_fallback_url.clone(),
        })
    }

    /// run nmcli and return its stdout
    async fn nmcli(&self, args: &[&str]) -> Result<String> {
        debug!("{} {}", Self::NMCLI, args.join(" "));

        let output = Command::new(Self::NMCLI)
            .args(args)
            .output()
            .await
            .context(format!("failed to run {} {args:?}", Self::NMCLI))?;

        ensure!(
            output.status.success(),
            "{} {args:?} failed with {}: {}",
            Self::NMCLI,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );

        String::from_utf8(output.stdout).context("failed to decode nmcli output")
    }

    async fn devices(&self) -> Result<Vec<Device>> {
        let out = self
            .nmcli(&["-t", "-f", "DEVICE,TYPE,STATE", "device", "status"])
            .await?;

        let mut devices = parse_devices(&out);
        if let Some(allowed) = &self.interfaces {
            devices.retain(|device| allowed.contains(&device.name));
        }
        devices.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(devices)
    }

    async fn ipv4(&self, device: &str) -> Ipv4Status {
        match self
            .nmcli(&["-t", "-g", "IP4.ADDRESS", "device", "show", device])
            .await
        {
            Ok(out) => parse_ipv4(&out),
            Err(e) => {
                info!("error getting ip of {device}: {e:#}");
                Ipv4Status::Error
            }
        }
    }

    async fn wifi_signal(&self, device: &str) -> WifiSignal {
        match self
            .nmcli(&[
                "-t",
                "-f",
                "IN-USE,SSID,SIGNAL",
                "device",
                "wifi",
                "list",
                "ifname",
                device,
                "--rescan",
                "no",
            ])
            .await
        {
            Ok(out) => parse_wifi_signal(&out),
            Err(e) => {
                info!("error getting ssid of {device}: {e:#}");
                WifiSignal::Error
            }
        }
    }

    async fn connections(&self, active_only: bool) -> Result<Vec<Profile>> {
        let mut args = vec!["-t", "-f", "NAME,TYPE", "connection", "show"];
        if active_only {
            args.push("--active");
        }

        Ok(parse_wifi_profiles(&self.nmcli(&args).await?))
    }
}

impl NetworkControl for NetworkClient {
    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.connections(false).await
    }

    async fn connect(&self, handle: String) -> Result<ConnectOutcome> {
        if !is_valid_handle(&handle) {
            bail!("illegal characters in connection id {handle:?}");
        }

        let usable_wifi = self.devices().await?.iter().any(|device| {
            device.kind == Self::WIFI_DEVICE_TYPE
                && device.state != "unavailable"
                && device.state != "unmanaged"
        });
        if !usable_wifi {
            return Ok(ConnectOutcome::DeviceUnavailable);
        }

        if self
            .connections(true)
            .await?
            .iter()
            .any(|profile| profile.handle == handle)
        {
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        info!("connecting {handle} via {:?}", self.connect_helper);
        let status = Command::new(&self.connect_helper)
            .arg(&handle)
            .status()
            .await
            .context(format!("failed to run {:?}", self.connect_helper))?;

        if status.success() {
            Ok(ConnectOutcome::Connected)
        } else {
            warn!("connect helper exited with {status}");
            Ok(ConnectOutcome::Failed)
        }
    }

    async fn restart(&self) -> Result<()> {
        let (program, args) = self
            .reboot_command
            .split_first()
            .context("failed to restart: reboot command is empty")?;

        info!("restart requested: {}", self.reboot_command.join(" "));
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .context(format!("failed to run {program}"))?;

        ensure!(status.success(), "{program} exited with {status}");
        Ok(())
    }
}

impl NetworkProbe for NetworkClient {
    async fn interfaces(&self) -> Result<InterfaceReport> {
        let mut report = InterfaceReport::default();

        for device in self.devices().await? {
            let activated = device.state == Self::ACTIVATED_STATE;

            let ipv4 = if activated {
                self.ipv4(&device.name).await
            } else {
                Ipv4Status::Absent
            };

            if activated && device.kind == Self::WIFI_DEVICE_TYPE && report.wifi.is_none() {
                report.wifi = Some(WifiStatus {
                    interface: device.name.clone(),
                    signal: self.wifi_signal(&device.name).await,
                });
            }

            report.table.insert(
                device.name.clone(),
                InterfaceStatus {
                    name: device.name,
                    kind: device.kind,
                    state: device.state,
                    ipv4,
                },
            );
        }

        Ok(report)
    }

    async fn dns_reachable(&self, hostname: String) -> bool {
        match tokio::net::lookup_host((hostname.as_str(), 80)).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(e) => {
                info!("error checking dns: {e}");
                false
            }
        }
    }

    async fn wan_status(&self, dns_reachable: bool) -> Result<String> {
        if dns_reachable {
            let res = self
                .http
                .get(&self.wan_ip_url)
                .send()
                .await
                .context(format!("failed to send GET request to {}", self.wan_ip_url))?;

            let body = handle_http_response(res, "wan ip request").await?;
            Ok(body.trim().to_string())
        } else {
            let res = self
                .http
                .get(&self.wan_fallback_url)
                .send()
                .await
                .context(format!(
                    "failed to send GET request to {}",
                    self.wan_fallback_url
                ))?;

            handle_http_response(res, "wan reachability request").await?;
            Ok("online".to_string())
        }
    }
}

/// Only what the setuid connect helper accepts: ASCII alphanumerics, `_`,
/// `.` and space.
pub fn is_valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ' '))
}

/// Splits one line of `nmcli -t` output, honouring `\:` and `\\` escapes.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => field.extend(chars.next()),
            ':' => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);

    fields
}

fn parse_devices(out: &str) -> Vec<Device> {
    out.lines()
        .filter_map(|line| match split_terse(line).as_slice() {
            [name, kind, state, ..] if !name.is_empty() => Some(Device {
                name: name.clone(),
                kind: kind.clone(),
                state: state.clone(),
            }),
            _ => None,
        })
        .collect()
}

fn parse_ipv4(out: &str) -> Ipv4Status {
    out.lines()
        .flat_map(|line| line.split(" | "))
        .map(str::trim)
        .find(|addr| !addr.is_empty())
        .map_or(Ipv4Status::Absent, |addr| {
            Ipv4Status::Address(addr.to_string())
        })
}

fn parse_wifi_signal(out: &str) -> WifiSignal {
    out.lines()
        .find_map(|line| match split_terse(line).as_slice() {
            [in_use, ssid, signal, ..] if in_use == "*" => Some(WifiSignal::Associated {
                ssid: ssid.clone(),
                strength: signal.trim().parse().unwrap_or(0),
            }),
            _ => None,
        })
        .unwrap_or(WifiSignal::Unknown)
}

fn parse_wifi_profiles(out: &str) -> Vec<Profile> {
    out.lines()
        .filter_map(|line| match split_terse(line).as_slice() {
            [name, kind, ..] if kind == NetworkClient::WIFI_CONNECTION_TYPE => Some(Profile {
                name: name.clone(),
                handle: name.clone(),
            }),
            _ => None,
        })
        .collect()
}
