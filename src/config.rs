use clap::Parser;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Immutable service configuration, loaded once at startup and passed to
/// every component by reference. Nothing else reads the process environment.
#[derive(Parser, Serialize, Deserialize, Validate, Clone, Debug)]
#[command(author, version, about)]
pub struct Config {
    /// Shared secret for webhook signatures. Never logged.
    #[arg(long, env, default_value = "changeme")]
    #[serde(default = "default_webhook_secret")]
    #[validate(length(min = 1))]
    pub webhook_secret: String,
    #[arg(long, env, default_value = "3000")]
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[arg(long, env, default_value = "9090")]
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[arg(long, env, default_value = "Public Sale")]
    #[serde(default = "default_source_name")]
    #[validate(length(min = 1))]
    pub source_name: String,

    #[arg(long, env)]
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
    #[arg(long, env)]
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[arg(long, env)]
    #[serde(default)]
    pub telegram_chat_id: Option<String>,

    #[arg(long, env, action = clap::ArgAction::Set, default_value = "true")]
    #[serde(default = "default_true")]
    pub mask_buyer: bool,
    #[arg(long, env, default_value = "10000")]
    #[serde(default = "default_whale_usd_threshold")]
    pub whale_usd_threshold: Decimal,
    #[arg(long, env, default_value = "IDR")]
    #[serde(default = "default_local_currency")]
    pub local_currency: String,
    /// Exchange rate used to render the local-currency estimate.
    #[arg(long, env, default_value = "15500")]
    #[serde(default = "default_usd_to_local_rate")]
    pub usd_to_local_rate: Decimal,

    #[arg(long, env, default_value = "sqlite://data/dedup.db")]
    #[serde(default = "default_database_url")]
    #[validate(length(min = 1))]
    pub database_url: String,
    #[arg(long, env, default_value = "5000")]
    #[serde(default = "default_dedup_max_entries")]
    #[validate(range(min = 1))]
    pub dedup_max_entries: u32,

    #[arg(long, env, action = clap::ArgAction::Set, default_value = "false")]
    #[serde(default)]
    pub enable_watcher: bool,
    #[arg(long, env)]
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[arg(long, env)]
    #[serde(default)]
    pub sale_contract: Option<String>,
    #[arg(long, env, default_value = default_event_signature())]
    #[serde(default = "default_event_signature_string")]
    pub event_signature: String,
    #[arg(long, env, default_value = "TOKEN")]
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,
    #[arg(long, env, default_value = "18")]
    #[serde(default = "default_token_decimals")]
    #[validate(range(max = 77))]
    pub token_decimals: u32,
    /// Blocks to wait before an on-chain purchase is announced.
    #[arg(long, env, default_value = "5")]
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[arg(long, env)]
    #[serde(default)]
    pub explorer_base: Option<String>,
    #[arg(long, env, default_value = "15")]
    #[serde(default = "default_poll_interval_secs")]
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,

    #[arg(long, env, default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

pub const PLACEHOLDER_SECRET: &str = "changeme";

fn default_webhook_secret() -> String {
    PLACEHOLDER_SECRET.to_string()
}
fn default_http_port() -> u16 {
    3000
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_source_name() -> String {
    "Public Sale".to_string()
}
fn default_true() -> bool {
    true
}
fn default_whale_usd_threshold() -> Decimal {
    Decimal::from(10_000)
}
fn default_local_currency() -> String {
    "IDR".to_string()
}
fn default_usd_to_local_rate() -> Decimal {
    Decimal::from(15_500)
}
fn default_database_url() -> String {
    "sqlite://data/dedup.db".to_string()
}
fn default_dedup_max_entries() -> u32 {
    5000
}
const fn default_event_signature() -> &'static str {
    "event Purchase(address indexed buyer, uint256 amountToken, uint256 paidAmount)"
}
fn default_event_signature_string() -> String {
    default_event_signature().to_string()
}
fn default_token_symbol() -> String {
    "TOKEN".to_string()
}
fn default_token_decimals() -> u32 {
    18
}
fn default_confirmations() -> u64 {
    5
}
fn default_poll_interval_secs() -> u64 {
    15
}
fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config() -> Config {
    let figment = Figment::new()
        .merge(Toml::file("config.toml"))
        .merge(Env::prefixed("BUYBOT_"));
    let config: Config = figment.extract().expect("Failed to load config");
    config.validate().expect("Invalid config");
    config
}

impl Config {
    /// Whether the configured secret is still the shipped placeholder.
    /// A deployment smell worth a startup warning, not a startup failure.
    pub fn has_placeholder_secret(&self) -> bool {
        self.webhook_secret == PLACEHOLDER_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_extract_from_empty_sources() {
        let config: Config = Figment::new().extract().unwrap();
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.dedup_max_entries, 5000);
        assert_eq!(config.confirmations, 5);
        assert_eq!(config.token_decimals, 18);
        assert!(config.mask_buyer);
        assert!(!config.enable_watcher);
        assert!(config.has_placeholder_secret());
    }
}
