//! Online/offline status shared between the host and the update loop.
//!
//! The host owns a [`ConnectivityHandle`] and publishes status changes; the
//! update loop and the downloader hold [`Connectivity`] receivers. Readers can
//! poll with [`Connectivity::is_online`] or wait for the status to flip with
//! [`Connectivity::went_offline`].

use crate::constants::CONNECTIVITY_PROBE_TIMEOUT;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Read side of the connectivity status.
#[derive(Debug, Clone)]
pub struct Connectivity {
    rx: watch::Receiver<bool>,
}

/// Write side of the connectivity status.
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    /// A provider/handle pair starting in the given state.
    #[must_use]
    pub fn new(online: bool) -> (ConnectivityHandle, Self) {
        let (tx, rx) = watch::channel(online);
        (
            ConnectivityHandle {
                tx,
            },
            Self {
                rx,
            },
        )
    }

    /// A provider that is online forever.
    #[must_use]
    pub fn always_online() -> Self {
        let (handle, connectivity) = Self::new(true);
        // The receiver keeps reporting the last value once the sender is gone.
        drop(handle);
        connectivity
    }

    /// Current status.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the status is offline.
    ///
    /// Resolves immediately when already offline. Never resolves when the
    /// handle has been dropped while online.
    pub async fn went_offline(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|online| !*online).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl ConnectivityHandle {
    /// Publish a new status. Receivers are only woken on actual changes.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
    }

    /// Last published status.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Periodically probe `address` (`host:port`) and publish the result.
///
/// A successful TCP connect within the probe timeout counts as online.
pub fn spawn_probe(handle: ConnectivityHandle, address: String, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let online = probe_once(&address).await;
            debug!("Connectivity probe to {address}: {}", if online { "reachable" } else { "unreachable" });
            handle.set_online(online);
        }
    })
}

async fn probe_once(address: &str) -> bool {
    matches!(
        tokio::time::timeout(CONNECTIVITY_PROBE_TIMEOUT, TcpStream::connect(address)).await,
        Ok(Ok(_))
    )
}

/// `host:port` of an http(s) URL, for use with [`spawn_probe`].
#[must_use]
pub fn probe_address(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let port = parsed.port_or_known_default()?;
    Some(format!("{host}:{port}"))
}
