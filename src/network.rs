/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::network
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Hold the run until an external endpoint answers, warning
    the user once about a prolonged outage and giving up after
    the configured timeout.

  Security / Safety Notes:
    Only a plain GET is issued; the response body is ignored.

  Dependencies:
    reqwest for the probe, tokio::time for the poll interval.

  Operational Scope:
    First gate of every scheduled run. No update work happens
    while it returns false.

  Revision History:
    2026-09-22 COD  Authored connectivity prober.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Elapsed time counted in slept intervals
    - At most one warning and one error per wait
============================================================*/

use std::time::Duration;

use tokio::time::sleep;

use crate::config::NetworkConfig;
use crate::error::{Result, WauError};
use crate::locale::{Locale, MessageKind, TemplateArgs};
use crate::logger::Logger;
use crate::notify::{NotificationEvent, NotificationSink, Severity};

const NOTIFICATION_TAG: &str = "network";

/// One connectivity check.
#[allow(async_fn_in_trait)]
pub trait ConnectivityProbe {
    async fn probe(&self) -> bool;
}

/// Probe issuing an HTTP GET against a fixed endpoint.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.interval_secs.max(1)))
            .user_agent(concat!("Syn-Wau/", env!("CARGO_PKG_VERSION"), " (windows)"))
            .build()
            .map_err(|err| WauError::Network(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

impl ConnectivityProbe for HttpProbe {
    async fn probe(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Poll `probe` until it succeeds or `config.timeout_secs` of waiting have
/// been slept through.
pub async fn wait_for_connectivity<P, N>(
    probe: &P,
    notifier: &N,
    locale: &Locale,
    logger: &Logger,
    config: &NetworkConfig,
) -> bool
where
    P: ConnectivityProbe,
    N: NotificationSink,
{
    let interval = config.interval_secs.max(1);
    let mut elapsed = 0u64;
    let mut warned = false;

    loop {
        if probe.probe().await {
            if elapsed > 0 {
                logger.info("NETWORK", format!("Connected after {elapsed}s"));
            }
            return true;
        }

        if elapsed >= config.timeout_secs {
            logger.error(
                "NETWORK",
                WauError::NetworkTimeout { seconds: elapsed }.to_string(),
            );
            notify_outage(notifier, locale, MessageKind::ConnectionTimeout, Severity::Error, elapsed)
                .await;
            return false;
        }

        if !warned && elapsed >= config.warn_after_secs {
            warned = true;
            logger.warn(
                "NETWORK",
                format!("No connection to {} after {elapsed}s; still waiting", config.url),
            );
            notify_outage(notifier, locale, MessageKind::ConnectionWaiting, Severity::Warning, elapsed)
                .await;
        }

        logger.debug("NETWORK", format!("Probe failed at {elapsed}s"));
        sleep(Duration::from_secs(interval)).await;
        elapsed += interval;
    }
}

async fn notify_outage<N: NotificationSink>(
    notifier: &N,
    locale: &Locale,
    kind: MessageKind,
    severity: Severity,
    elapsed: u64,
) {
    let args = TemplateArgs::new().with("minutes", (elapsed / 60).to_string());
    notifier
        .notify(NotificationEvent::from_template(
            locale,
            kind,
            &args,
            severity,
            NOTIFICATION_TAG,
        ))
        .await;
}
