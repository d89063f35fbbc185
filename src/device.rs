// src/device.rs
//
// Fire-and-forget HTTP plumbing between the panel and the device. The GUI
// pushes commands down an mpsc channel; a dedicated thread owning the tokio
// runtime turns each command into one GET against the device and pushes the
// one useful kind of answer (a state read) back up a second channel.
// Failures are logged and dropped: no retry, no rollback.

use std::sync::mpsc::{Receiver, Sender};

use crate::relay::RelayId;

/// Commands from the GUI thread to the device worker.
#[derive(Debug, Clone)]
pub enum DeviceCommand {
    /// Drive a relay to the given state. The response body is ignored.
    SetRelay {
        host: String,
        relay: RelayId,
        on: bool,
    },
    /// Read a relay's current state back from the device.
    FetchState { host: String, relay: RelayId },
}

/// Answers the worker reports back to the GUI thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    StateFetched { relay: RelayId, is_on: bool },
}

pub fn set_relay_url(host: &str, relay: RelayId, on: bool) -> String {
    format!(
        "http://{}/{}/{}",
        host,
        relay.key(),
        if on { "on" } else { "off" }
    )
}

pub fn state_url(host: &str, relay: RelayId) -> String {
    format!("http://{}/{}/state", host, relay.key())
}

/// The device answers a state read with exactly `on` or `off` (plus
/// whatever line ending its firmware felt like). Anything else is noise.
pub fn parse_state_body(body: &str) -> Option<bool> {
    match body.trim() {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// Runs inside the tokio runtime on its own thread. Each command becomes one
/// spawned task, so a slow request never holds up the next one; completion
/// order is whatever the network gives us.
pub async fn device_worker(command_rx: Receiver<DeviceCommand>, event_tx: Sender<DeviceEvent>) {
    let client = reqwest::Client::new();

    while let Ok(cmd) = command_rx.recv() {
        let client = client.clone();
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            match cmd {
                DeviceCommand::SetRelay { host, relay, on } => {
                    let url = set_relay_url(&host, relay, on);
                    match client.get(&url).send().await {
                        Ok(resp) if resp.status().is_success() => {
                            log::debug!("{url} -> {}", resp.status());
                        }
                        Ok(resp) => {
                            log::error!("device rejected {url}: {}", resp.status());
                        }
                        Err(err) => {
                            log::error!("failed to toggle {}: {err}", relay.key());
                        }
                    }
                }
                DeviceCommand::FetchState { host, relay } => {
                    let url = state_url(&host, relay);
                    let body = match client.get(&url).send().await {
                        Ok(resp) => resp.text().await,
                        Err(err) => Err(err),
                    };
                    match body {
                        Ok(body) => match parse_state_body(&body) {
                            Some(is_on) => {
                                event_tx.send(DeviceEvent::StateFetched { relay, is_on }).ok();
                            }
                            None => {
                                log::warn!("unexpected state body from {url}: {body:?}");
                            }
                        },
                        Err(err) => {
                            log::error!("failed to read {} state: {err}", relay.key());
                        }
                    }
                }
            }
        });
    }
    // All senders gone means the GUI is shutting down; nothing to clean up.
}
