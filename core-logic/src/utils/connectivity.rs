//! Connectivity - reachability gate run before an account touches the network
//!
//! A [`Probe`] answers one question: can this egress (a proxy URL or the
//! direct connection) reach the outside world within the timeout? The
//! [`ConnectivityProbe`] wraps a probe with the [`ProxyPool`] so a failing
//! proxy can be rotated out before the account's workflows start.
//!
//! # Rotation Flow
//!
//! 1. The account's sticky proxy is taken from the pool (or none when proxies are disabled)
//! 2. The probe is run against it
//! 3. On failure with rotation enabled, the pool rotates the assignment and the probe runs again
//! 4. After `max(pool size, 1) * rotation_rounds` failed attempts the account is given up on
//!    with [`WorkflowError::ConnectivityFailure`]

use crate::config::ProbeSettings;
use crate::error::WorkflowError;
use crate::utils::logger::mask_account;
use crate::utils::proxy_manager::ProxyPool;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lightweight reachability check. Never errors: any failure is `false`.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, proxy: Option<&str>) -> bool;
}

/// Probes with a plain GET through reqwest, optionally via a proxy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(settings: &ProbeSettings) -> Self {
        Self {
            url: settings.url.clone(),
            timeout: settings.timeout(),
        }
    }

    fn client(&self, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder().timeout(self.timeout);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        builder.build()
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, proxy: Option<&str>) -> bool {
        let client = match self.client(proxy) {
            Ok(c) => c,
            Err(e) => {
                debug!("Failed to build probe client: {}", e);
                return false;
            }
        };

        match client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!("Probe returned HTTP {}", response.status());
                false
            }
            Err(e) => {
                debug!("Probe request failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl<P: Probe + ?Sized> Probe for Box<P> {
    async fn check(&self, proxy: Option<&str>) -> bool {
        (**self).check(proxy).await
    }
}

/// Runs a [`Probe`] for an account, rotating proxies on failure.
pub struct ConnectivityProbe<P> {
    probe: P,
    settings: ProbeSettings,
}

impl<P: Probe> ConnectivityProbe<P> {
    pub fn new(probe: P, settings: ProbeSettings) -> Self {
        Self { probe, settings }
    }

    pub fn inner(&self) -> &P {
        &self.probe
    }

    pub async fn check(&self, proxy: Option<&str>) -> bool {
        self.probe.check(proxy).await
    }

    /// Returns the proxy the account should use (`None` means direct).
    ///
    /// `account` is the full identity the pool assignment is keyed by; logs
    /// only carry its masked form.
    ///
    /// Without rotation a single failed probe is final. With rotation the
    /// loop is bounded by the pool size times `rotation_rounds`.
    pub async fn probe_with_rotation(
        &self,
        pool: &ProxyPool,
        account: &str,
        use_proxy: bool,
        rotate_on_fail: bool,
    ) -> Result<Option<String>, WorkflowError> {
        let mut proxy = if use_proxy { pool.assign(account) } else { None };
        let rotating = rotate_on_fail && use_proxy && !pool.is_empty();
        let max_attempts = if rotating {
            (pool.len().max(1) as u32).saturating_mul(self.settings.rotation_rounds.max(1))
        } else {
            1
        };

        let shown = mask_account(account);
        let mut attempt = 1;
        loop {
            let label = proxy.as_deref().unwrap_or("direct");
            info!(target: "task_result", account = %shown, proxy = label, attempt, "Checking connection");

            if self.probe.check(proxy.as_deref()).await {
                info!(target: "task_result", account = %shown, proxy = label, outcome = "ok", "Connection SUCCESS");
                return Ok(proxy);
            }

            warn!(target: "task_result", account = %shown, proxy = label, attempt, outcome = "failed", "Connection FAILED");

            if attempt >= max_attempts {
                return Err(WorkflowError::ConnectivityFailure {
                    account: account.to_string(),
                    attempts: attempt,
                });
            }

            proxy = pool.rotate(account);
            tokio::time::sleep(self.settings.rotation_delay()).await;
            attempt += 1;
        }
    }
}
