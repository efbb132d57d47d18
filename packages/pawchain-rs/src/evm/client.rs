//! EVM chain client for the wPAW token.
//!
//! Exposes the [`EvmClient`] capability trait consumed by the bridge service
//! and watchers, plus the HTTP implementation backed by an alloy provider.
//! Tests supply in-memory doubles of the trait.

use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::str::FromStr;

use crate::evm::contracts::WrappedPaw;

/// A parsed `SwapToNative` burn event.
#[derive(Debug, Clone)]
pub struct SwapToNativeEvent {
    /// Burner's EVM account
    pub from: Address,
    /// Destination native address, exactly as emitted (validated downstream)
    pub paw: String,
    /// Burned amount in wPAW wei (18 decimals)
    pub amount_wei: U256,
    pub tx_hash: String,
    pub block_number: u64,
}

/// Chain capability used by the EVM watcher and the bridge service.
#[async_trait]
pub trait EvmClient: Send + Sync {
    /// Latest block number on the chain
    async fn latest_block(&self) -> Result<u64>;

    /// Timestamp of a block, seconds since epoch
    async fn block_timestamp(&self, number: u64) -> Result<u64>;

    /// wPAW balance of an account, in wei
    async fn wrapped_balance(&self, account: Address) -> Result<U256>;

    /// `SwapToNative` events emitted by the token in `[from, to]` (inclusive)
    async fn swap_to_native_logs(&self, from: u64, to: u64) -> Result<Vec<SwapToNativeEvent>>;
}

/// HTTP-provider implementation of [`EvmClient`].
pub struct HttpEvmClient {
    provider: RootProvider<Http<Client>>,
    token_address: Address,
}

impl HttpEvmClient {
    pub fn new(rpc_url: &str, token_address: &str) -> Result<Self> {
        let url = rpc_url.parse().wrap_err("Failed to parse EVM RPC URL")?;
        let provider = ProviderBuilder::new().on_http(url);
        let token_address =
            Address::from_str(token_address).wrap_err("Invalid wPAW token address")?;

        tracing::info!(token = %token_address, "EVM client initialized");

        Ok(Self {
            provider,
            token_address,
        })
    }

    /// keccak256("SwapToNative(address,string,uint256)")
    fn swap_to_native_signature() -> B256 {
        keccak256(b"SwapToNative(address,string,uint256)")
    }

    /// Parse a `SwapToNative` log.
    ///
    /// Indexed topics:
    /// - topics[0] = event signature
    /// - topics[1] = from (address, left-padded)
    ///
    /// Non-indexed data (abi encoded):
    /// - [0..32]   offset to the paw string (0x40)
    /// - [32..64]  amount (uint256)
    /// - [64..96]  string length
    /// - [96..]    string bytes
    fn parse_swap_log(log: &Log) -> Result<SwapToNativeEvent> {
        let topics = log.topics();
        if topics.len() < 2 {
            return Err(eyre!("Not enough topics for SwapToNative event"));
        }
        let from = Address::from_slice(&topics[1].as_slice()[12..]);

        let data = log.data().data.as_ref();
        if data.len() < 96 {
            return Err(eyre!("Not enough data in SwapToNative event"));
        }
        let amount_wei = U256::from_be_slice(&data[32..64]);
        let len = U256::from_be_slice(&data[64..96])
            .try_into()
            .map_err(|_| eyre!("String length overflows usize"))?;
        let len: usize = len;
        if data.len() < 96 + len {
            return Err(eyre!("Truncated paw string in SwapToNative event"));
        }
        let paw = std::str::from_utf8(&data[96..96 + len])
            .wrap_err("paw destination is not valid UTF-8")?
            .to_string();

        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| eyre!("Missing transaction hash"))?;
        let block_number = log
            .block_number
            .ok_or_else(|| eyre!("Missing block number"))?;

        Ok(SwapToNativeEvent {
            from,
            paw,
            amount_wei,
            tx_hash: format!("{:?}", tx_hash),
            block_number,
        })
    }
}

#[async_trait]
impl EvmClient for HttpEvmClient {
    async fn latest_block(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .wrap_err("Failed to get block number")
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number), false)
            .await
            .wrap_err("Failed to get block")?
            .ok_or_else(|| eyre!("Block {} not found", number))?;
        Ok(block.header.timestamp)
    }

    async fn wrapped_balance(&self, account: Address) -> Result<U256> {
        let token = WrappedPaw::new(self.token_address, &self.provider);
        let result = token
            .balanceOf(account)
            .call()
            .await
            .wrap_err("balanceOf query failed")?;
        Ok(result._0)
    }

    async fn swap_to_native_logs(&self, from: u64, to: u64) -> Result<Vec<SwapToNativeEvent>> {
        let filter = Filter::new()
            .address(self.token_address)
            .event_signature(Self::swap_to_native_signature())
            .from_block(from)
            .to_block(to);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .wrap_err("Failed to get logs")?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match Self::parse_swap_log(log) {
                Ok(event) => events.push(event),
                Err(e) => {
                    // A malformed event cannot become well-formed on retry;
                    // log loudly and keep scanning.
                    tracing::error!(
                        tx_hash = ?log.transaction_hash,
                        error = %e,
                        "Failed to parse SwapToNative log, skipping"
                    );
                }
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, LogData};

    fn encode_swap_data(paw: &str, amount_wei: U256) -> Vec<u8> {
        let mut data = Vec::new();
        let mut offset = [0u8; 32];
        offset[31] = 0x40;
        data.extend_from_slice(&offset);
        data.extend_from_slice(&amount_wei.to_be_bytes::<32>());
        let mut len = [0u8; 32];
        len[31] = paw.len() as u8;
        data.extend_from_slice(&len);
        data.extend_from_slice(paw.as_bytes());
        // abi encoding pads the tail to a 32-byte boundary
        while data.len() % 32 != 0 {
            data.push(0);
        }
        data
    }

    fn swap_log(from: Address, paw: &str, amount_wei: U256) -> Log {
        let topics = vec![
            HttpEvmClient::swap_to_native_signature(),
            B256::left_padding_from(from.as_slice()),
        ];
        let data = encode_swap_data(paw, amount_wei);
        let mut log = Log {
            inner: alloy::primitives::Log {
                address: Address::repeat_byte(0x77),
                data: LogData::new_unchecked(topics, Bytes::from(data)),
            },
            ..Default::default()
        };
        log.transaction_hash = Some(B256::repeat_byte(0xAA));
        log.block_number = Some(1234);
        log
    }

    #[test]
    fn test_parse_swap_log() {
        let from = Address::repeat_byte(0x42);
        let paw = "paw_1nrcne47secz1hnm9syepdoob7t1r4xrhdzih3zohb1c3z178edd7b6ygc4x";
        let amount = U256::from(5_000_000_000_000_000_000u64);

        let event = HttpEvmClient::parse_swap_log(&swap_log(from, paw, amount)).unwrap();
        assert_eq!(event.from, from);
        assert_eq!(event.paw, paw);
        assert_eq!(event.amount_wei, amount);
        assert_eq!(event.block_number, 1234);
    }

    #[test]
    fn test_parse_swap_log_rejects_truncated_data() {
        let from = Address::repeat_byte(0x42);
        let mut log = swap_log(from, "paw_1", U256::from(1u64));
        let topics = log.topics().to_vec();
        let truncated = log.data().data[..40].to_vec();
        log.inner.data = LogData::new_unchecked(topics, Bytes::from(truncated));
        assert!(HttpEvmClient::parse_swap_log(&log).is_err());
    }

    #[test]
    fn test_event_signature_matches_declaration() {
        assert_eq!(
            hex::encode(HttpEvmClient::swap_to_native_signature()),
            hex::encode(keccak256(b"SwapToNative(address,string,uint256)"))
        );
    }
}
