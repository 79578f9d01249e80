use std::str::FromStr;

use ethers_core::abi::{decode, Event, HumanReadableParser, ParamType, Token};
use ethers_core::types::{Address, H256, U256};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::normalize::EventArgs;

/// JSON-RPC client for the sale contract's chain. The wire protocol is kept
/// to the two calls this service needs: latest head and a filtered log range.
pub struct ChainClient {
    client: Client,
    base_url: String,
}

/// An undecoded log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "transactionHash")]
    pub transaction_hash: Option<String>,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
}

impl ChainClient {
    pub fn new(rpc_url: &str) -> Result<Self, anyhow::Error> {
        // HTTP/1.1 only: some RPC providers misbehave on ALPN upgrades.
        let client = reqwest::ClientBuilder::new()
            .http1_only()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: rpc_url.to_string(),
        })
    }

    async fn rpc_request<R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, anyhow::Error> {
        #[derive(Deserialize)]
        struct RpcEnvelope<T> {
            result: Option<T>,
            error: Option<serde_json::Value>,
        }

        let resp = self
            .client
            .post(&self.base_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow::anyhow!("RPC request failed: {} - {}", status, text));
        }
        let env: RpcEnvelope<R> = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("RPC response deserialization: {}. Response: {}", e, text))?;
        if let Some(err) = env.error {
            return Err(anyhow::anyhow!("RPC error: {}", err));
        }
        env.result
            .ok_or_else(|| anyhow::anyhow!("Empty result in RPC response: {}", text))
    }

    pub async fn latest_block(&self) -> Result<u64, anyhow::Error> {
        let hex_str: String = self.rpc_request("eth_blockNumber", json!([])).await?;
        Ok(parse_hex_u64(&hex_str)?)
    }

    /// Logs matching the sale contract and purchase topic in an inclusive
    /// block range.
    pub async fn purchase_logs(
        &self,
        from_block: u64,
        to_block: u64,
        contract: &str,
        topic0: H256,
    ) -> Result<Vec<LogEntry>, anyhow::Error> {
        self.rpc_request(
            "eth_getLogs",
            json!([{
                "fromBlock": format!("0x{from_block:x}"),
                "toBlock": format!("0x{to_block:x}"),
                "address": contract,
                "topics": [format!("{topic0:#x}")]
            }]),
        )
        .await
    }
}

/// Parses a human-readable event signature like
/// `event Purchase(address indexed buyer, uint256 amountToken, uint256 paidAmount)`.
pub fn parse_event_signature(signature: &str) -> Result<Event, anyhow::Error> {
    HumanReadableParser::parse_event(signature)
        .map_err(|e| anyhow::anyhow!("invalid event signature `{}`: {}", signature, e))
}

/// Decodes one raw log against the event ABI into `(tx_hash, block, args)`.
/// Indexed and data-encoded parameters come back in declaration order with
/// their ABI names attached.
pub fn decode_purchase_log(
    event: &Event,
    entry: &LogEntry,
) -> Result<(String, u64, EventArgs), anyhow::Error> {
    let tx_hash = entry
        .transaction_hash
        .clone()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| anyhow::anyhow!("log without transaction hash"))?;
    let block = parse_hex_u64(&entry.block_number)?;

    let data = hex::decode(entry.data.trim_start_matches("0x"))?;
    let non_indexed: Vec<ParamType> = event
        .inputs
        .iter()
        .filter(|p| !p.indexed)
        .map(|p| p.kind.clone())
        .collect();
    let mut data_tokens = decode(&non_indexed, &data)?.into_iter();
    // topics[0] is the event signature
    let mut topic_iter = entry.topics.iter().skip(1);

    let mut args = EventArgs::default();
    for param in &event.inputs {
        let value = if param.indexed {
            let topic = topic_iter
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing indexed topic for `{}`", param.name))?;
            topic_to_string(&param.kind, &H256::from_str(topic)?)
        } else {
            let token = data_tokens
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing data word for `{}`", param.name))?;
            token_to_string(&token)
        };
        args.push(param.name.clone(), value);
    }
    Ok((tx_hash, block, args))
}

fn token_to_string(token: &Token) -> String {
    match token {
        Token::Address(addr) => format!("{addr:#x}"),
        Token::Uint(value) | Token::Int(value) => value.to_string(),
        other => other.to_string(),
    }
}

fn topic_to_string(kind: &ParamType, topic: &H256) -> String {
    match kind {
        ParamType::Address => format!("{:#x}", Address::from_slice(&topic.as_bytes()[12..])),
        ParamType::Uint(_) | ParamType::Int(_) => {
            U256::from_big_endian(topic.as_bytes()).to_string()
        }
        _ => format!("{topic:#x}"),
    }
}

fn parse_hex_u64(value: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNATURE: &str =
        "event Purchase(address indexed buyer, uint256 amountToken, uint256 paidAmount)";

    fn amount_word(value: u64) -> String {
        format!("{:064x}", U256::from(value))
    }

    #[test]
    fn event_signature_topic() {
        let event = parse_event_signature(SIGNATURE).unwrap();
        assert_eq!(event.name, "Purchase");
        // keccak256("Purchase(address,uint256,uint256)") is stable
        assert_eq!(
            format!("{:#x}", event.signature()),
            format!(
                "0x{}",
                hex::encode(ethers_core::utils::keccak256(
                    b"Purchase(address,uint256,uint256)"
                ))
            )
        );
    }

    #[test]
    fn decodes_purchase_log_with_named_args() {
        let event = parse_event_signature(SIGNATURE).unwrap();
        let buyer_topic = format!(
            "0x{:0>64}",
            "beefcafe001122334455667788990011223344aa"
        );
        let entry = LogEntry {
            topics: vec![format!("{:#x}", event.signature()), buyer_topic],
            data: format!("0x{}{}", amount_word(1_000_000), amount_word(250)),
            transaction_hash: Some("0xdeadbeef".into()),
            block_number: "0x64".into(),
        };
        let (tx_hash, block, args) = decode_purchase_log(&event, &entry).unwrap();
        assert_eq!(tx_hash, "0xdeadbeef");
        assert_eq!(block, 100);
        assert_eq!(
            args.resolve("buyer", 0).unwrap(),
            "0xbeefcafe001122334455667788990011223344aa"
        );
        assert_eq!(args.resolve("amountToken", 1).unwrap(), "1000000");
        assert_eq!(args.resolve("paidAmount", 2).unwrap(), "250");
    }

    #[test]
    fn malformed_log_is_an_error() {
        let event = parse_event_signature(SIGNATURE).unwrap();
        let entry = LogEntry {
            topics: vec![format!("{:#x}", event.signature())],
            data: "0x".into(),
            transaction_hash: Some("0xdeadbeef".into()),
            block_number: "0x64".into(),
        };
        assert!(decode_purchase_log(&event, &entry).is_err());
    }

    #[test]
    fn missing_transaction_hash_is_an_error() {
        let event = parse_event_signature(SIGNATURE).unwrap();
        let entry = LogEntry {
            topics: vec![],
            data: "0x".into(),
            transaction_hash: None,
            block_number: "0x1".into(),
        };
        assert!(decode_purchase_log(&event, &entry).is_err());
    }
}
