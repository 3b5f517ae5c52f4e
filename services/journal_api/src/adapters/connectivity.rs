//! services/journal_api/src/adapters/connectivity.rs
//!
//! Publishes an `is_online` flag by periodically probing a well-known URL.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct ConnectivityProbe {
    http: reqwest::Client,
    url: String,
    interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(url: String, interval: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { http, url, interval })
    }

    /// One probe. Any 2xx counts as online.
    pub async fn probe(&self) -> bool {
        match self.http.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }

    /// Probes once, then keeps probing until `shutdown` fires. Receivers only
    /// wake when the flag actually flips.
    pub async fn start(self, shutdown: CancellationToken) -> watch::Receiver<bool> {
        let initial = self.probe().await;
        info!("Connectivity probe started, online: {}", initial);
        let (tx, rx) = watch::channel(initial);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let online = self.probe().await;
                        let flipped = tx.send_if_modified(|current| {
                            let changed = *current != online;
                            *current = online;
                            changed
                        });
                        if flipped {
                            info!("Connectivity changed, online: {}", online);
                        }
                    }
                }
            }
            debug!("Connectivity probe stopped.");
        });
        rx
    }
}
