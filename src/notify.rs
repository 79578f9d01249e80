use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::format;
use crate::metrics::Metrics;
use crate::models::{EventSource, PurchaseEvent};

const BOT_NAME: &str = "Live Buy Bot";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// One configured notification target.
#[derive(Clone, Debug)]
pub enum Channel {
    Discord { webhook_url: String },
    Telegram { api_url: String, chat_id: String },
    /// Log-only fallback when no chat channel is configured.
    Console,
}

impl Channel {
    pub fn telegram(bot_token: &str, chat_id: &str) -> Self {
        Channel::Telegram {
            api_url: format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
            chat_id: chat_id.to_string(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Channel::Discord { .. } => "discord",
            Channel::Telegram { .. } => "telegram",
            Channel::Console => "console",
        }
    }
}

/// Rendering knobs; a subset of the service config.
#[derive(Clone, Debug)]
pub struct NotifySettings {
    pub source_name: String,
    pub mask_buyer: bool,
    pub local_currency: String,
    pub usd_to_local_rate: Decimal,
    pub whale_usd_threshold: Decimal,
}

impl NotifySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_name: config.source_name.clone(),
            mask_buyer: config.mask_buyer,
            local_currency: config.local_currency.clone(),
            usd_to_local_rate: config.usd_to_local_rate,
            whale_usd_threshold: config.whale_usd_threshold,
        }
    }
}

/// A fully rendered notification, identical across channels. Unavailable
/// valuations render as "N/A" so the message structure stays stable.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub title: String,
    pub buyer: String,
    pub amount: String,
    pub usd: String,
    pub local_label: String,
    pub local: String,
    pub reference: String,
    pub url: Option<String>,
    pub timestamp: String,
    pub footer: String,
    pub whale: bool,
}

/// Fans a canonical purchase event out to every configured channel. Channel
/// failures are logged and isolated; `announce` never fails the caller.
pub struct Notifier {
    client: reqwest::Client,
    channels: Vec<Channel>,
    settings: NotifySettings,
    metrics: Arc<Metrics>,
}

/// Builds the channel list from config, falling back to console when nothing
/// is configured.
pub fn build_channels(config: &Config) -> Vec<Channel> {
    let mut channels = Vec::new();
    if let Some(url) = config.discord_webhook_url.as_deref().filter(|u| !u.is_empty()) {
        channels.push(Channel::Discord {
            webhook_url: url.to_string(),
        });
    }
    match (
        config.telegram_bot_token.as_deref().filter(|t| !t.is_empty()),
        config.telegram_chat_id.as_deref().filter(|c| !c.is_empty()),
    ) {
        (Some(token), Some(chat_id)) => channels.push(Channel::telegram(token, chat_id)),
        (Some(_), None) | (None, Some(_)) => {
            warn!("Telegram is partially configured, skipping the channel")
        }
        (None, None) => {}
    }
    if channels.is_empty() {
        info!("No chat channels configured, using console notifier");
        channels.push(Channel::Console);
    }
    channels
}

impl Notifier {
    pub fn new(
        channels: Vec<Channel>,
        settings: NotifySettings,
        metrics: Arc<Metrics>,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::ClientBuilder::new().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            channels,
            settings,
            metrics,
        })
    }

    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Result<Self, anyhow::Error> {
        Self::new(
            build_channels(config),
            NotifySettings::from_config(config),
            metrics,
        )
    }

    pub fn render(&self, event: &PurchaseEvent) -> Announcement {
        let s = &self.settings;
        let whale = event.is_whale(s.whale_usd_threshold);
        let emoji = if whale { "🐋" } else { "🟢" };
        let title = match event.source {
            EventSource::Webhook => format!("{emoji} New Buy ({})", s.source_name),
            EventSource::OnChain => format!("{emoji} New On-Chain Buy"),
        };
        let buyer = if event.buyer.is_empty() {
            "N/A".to_string()
        } else if s.mask_buyer {
            format::mask_address(&event.buyer)
        } else {
            event.buyer.clone()
        };
        let amount = format!("{} {}", event.display_amount(), event.token_symbol)
            .trim_end()
            .to_string();
        let usd = format::format_currency(event.usd_total(), "USD")
            .unwrap_or_else(|| "N/A".to_string());
        let local = format::format_currency(
            event.local_total(s.usd_to_local_rate),
            &s.local_currency,
        )
        .unwrap_or_else(|| "N/A".to_string());

        Announcement {
            title,
            buyer,
            amount,
            usd,
            local_label: format!("Est. {}", s.local_currency),
            local,
            reference: event.dedup_key.clone(),
            url: event.explorer_tx_url.clone(),
            timestamp: event.timestamp.to_rfc3339(),
            footer: s.source_name.clone(),
            whale,
        }
    }

    /// Sends the event to every channel. A failure on one channel does not
    /// stop the others and is never surfaced to the inbound caller.
    pub async fn announce(&self, event: &PurchaseEvent) {
        let announcement = self.render(event);
        for channel in &self.channels {
            if let Err(e) = self.send(channel, &announcement).await {
                self.metrics.increment_notification_failures();
                warn!(
                    channel = channel.name(),
                    reference = %announcement.reference,
                    "Failed to send notification: {e:#}"
                );
            }
        }
    }

    async fn send(&self, channel: &Channel, a: &Announcement) -> Result<(), anyhow::Error> {
        match channel {
            Channel::Discord { webhook_url } => self.send_discord(webhook_url, a).await,
            Channel::Telegram { api_url, chat_id } => {
                self.send_telegram(api_url, chat_id, a).await
            }
            Channel::Console => {
                info!(
                    title = %a.title,
                    buyer = %a.buyer,
                    amount = %a.amount,
                    usd = %a.usd,
                    reference = %a.reference,
                    "Purchase announcement"
                );
                Ok(())
            }
        }
    }

    async fn send_discord(&self, webhook_url: &str, a: &Announcement) -> Result<(), anyhow::Error> {
        let payload = json!({
            "username": BOT_NAME,
            "embeds": [{
                "title": a.title,
                "url": a.url,
                "fields": [
                    { "name": "Buyer", "value": format!("`{}`", a.buyer), "inline": false },
                    { "name": "Amount", "value": a.amount, "inline": true },
                    { "name": "Est. USD", "value": a.usd, "inline": true },
                    { "name": a.local_label, "value": a.local, "inline": true },
                    { "name": "Order ID", "value": format!("`{}`", a.reference), "inline": true }
                ],
                "timestamp": a.timestamp,
                "footer": { "text": a.footer }
            }]
        });
        self.client
            .post(webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn send_telegram(
        &self,
        api_url: &str,
        chat_id: &str,
        a: &Announcement,
    ) -> Result<(), anyhow::Error> {
        let mut lines = vec![
            a.title.clone(),
            format!("Buyer: {}", a.buyer),
            format!("Amount: {}", a.amount),
            format!("Est. USD: {}", a.usd),
            format!("{}: {}", a.local_label, a.local),
        ];
        if let Some(url) = &a.url {
            lines.push(format!("Tx: {url}"));
        }
        let payload = json!({
            "chat_id": chat_id,
            "text": lines.join("\n"),
            "disable_web_page_preview": true
        });
        self.client
            .post(api_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
