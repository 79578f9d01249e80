use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};

use crate::chain::{self, ChainClient};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::normalize::{self, ChainContext};
use crate::notify::Notifier;
use crate::tracker::ConfirmationTracker;

/// Everything the on-chain loop needs, resolved from config up front so a
/// missing setting fails at startup, not mid-loop.
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub rpc_url: String,
    pub sale_contract: String,
    pub event_signature: String,
    pub confirmations: u64,
    pub poll_interval: Duration,
    pub context: ChainContext,
}

impl WatcherSettings {
    pub fn from_config(config: &Config) -> Result<Self, anyhow::Error> {
        let rpc_url = config
            .rpc_url
            .clone()
            .context("rpc_url is required when the chain watcher is enabled")?;
        let sale_contract = config
            .sale_contract
            .clone()
            .context("sale_contract is required when the chain watcher is enabled")?;
        Ok(Self {
            rpc_url,
            sale_contract,
            event_signature: config.event_signature.clone(),
            confirmations: config.confirmations,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            context: ChainContext {
                token_symbol: config.token_symbol.clone(),
                token_decimals: config.token_decimals,
                explorer_base: config.explorer_base.clone(),
            },
        })
    }
}

/// On-chain ingestion loop. Polls the chain head, scans new blocks for
/// purchase logs, and announces entries once their confirmation depth is
/// reached. Decode failures drop the log and keep the loop alive; transport
/// failures are fatal and bubble up so the process can be restarted by its
/// supervisor instead of running with a dead feed.
pub async fn watch_chain(
    settings: WatcherSettings,
    notifier: Arc<Notifier>,
    metrics: Arc<Metrics>,
) -> Result<(), anyhow::Error> {
    let event = chain::parse_event_signature(&settings.event_signature)?;
    let topic0 = event.signature();
    let client = ChainClient::new(&settings.rpc_url)?;

    info!(
        "Watching \"{}\" on {}, confirmations={}",
        event.name, settings.sale_contract, settings.confirmations
    );

    // This task is the only owner of the pending set; log arrival and block
    // arrival cannot interleave.
    let mut tracker = ConfirmationTracker::new(settings.confirmations);
    let mut last_scanned = client.latest_block().await?;

    loop {
        tokio::time::sleep(settings.poll_interval).await;
        let latest = client.latest_block().await?;

        if latest > last_scanned {
            let logs = client
                .purchase_logs(last_scanned + 1, latest, &settings.sale_contract, topic0)
                .await?;
            for entry in logs {
                match chain::decode_purchase_log(&event, &entry) {
                    Ok((tx_hash, block, args)) => {
                        info!("Seen {} tx={} @{}", event.name, tx_hash, block);
                        tracker.observe_log(tx_hash, block, args);
                    }
                    Err(e) => warn!("Dropping undecodable purchase log: {e:#}"),
                }
            }
            last_scanned = latest;
        }

        for observed in tracker.observe_block(latest) {
            match normalize::from_chain_log(&observed, &settings.context, Utc::now()) {
                Ok(purchase) => {
                    notifier.announce(&purchase).await;
                    metrics.increment_events();
                    info!("Announced tx={}", observed.tx_hash);
                }
                Err(e) => warn!(
                    "Dropping confirmed purchase tx={}: {e}",
                    observed.tx_hash
                ),
            }
        }
    }
}
