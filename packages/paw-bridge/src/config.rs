use alloy::primitives::U256;
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;

use pawchain_rs::types::{parse_paw, NativeAddress};

/// Main configuration for the bridge
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub node: NodeConfig,
    pub evm: EvmConfig,
    pub bridge: BridgeConfig,
}

/// Database configuration
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .finish()
    }
}

/// PAW node configuration
#[derive(Clone, Deserialize)]
pub struct NodeConfig {
    pub rpc_url: String,
    pub ws_url: String,
    /// Custody wallet id on the node
    pub wallet_id: String,
    pub hot_wallet: NativeAddress,
    pub cold_wallet: NativeAddress,
    /// Minimum balance kept in the hot wallet after a sweep, in atomic units
    pub hot_reserve_units: U256,
    /// Hot-wallet target share of total custody, percent (0..=100)
    pub hot_ratio_pct: u32,
}

/// Custom Debug that redacts wallet_id to prevent accidental log leakage.
impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("rpc_url", &self.rpc_url)
            .field("ws_url", &self.ws_url)
            .field("wallet_id", &"<redacted>")
            .field("hot_wallet", &self.hot_wallet)
            .field("cold_wallet", &self.cold_wallet)
            .field("hot_reserve_units", &self.hot_reserve_units)
            .field("hot_ratio_pct", &self.hot_ratio_pct)
            .finish()
    }
}

/// EVM chain configuration
#[derive(Clone, Deserialize)]
pub struct EvmConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub wpaw_address: String,
    pub private_key: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for EvmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("wpaw_address", &self.wpaw_address)
            .field("private_key", &"<redacted>")
            .field("confirmations", &self.confirmations)
            .finish()
    }
}

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    pub blacklist_url: String,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_evm_poll_interval")]
    pub evm_poll_interval_ms: u64,
}

/// Default functions
fn default_confirmations() -> u64 {
    5
}

fn default_api_port() -> u16 {
    3050
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_evm_poll_interval() -> u64 {
    5000
}

fn default_hot_ratio_pct() -> u32 {
    20
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    fn load_from_env() -> Result<Self> {
        let database = DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| eyre!("DATABASE_URL environment variable is required"))?,
        };

        let hot_wallet = env::var("NODE_HOT_WALLET")
            .map_err(|_| eyre!("NODE_HOT_WALLET environment variable is required"))?
            .parse::<NativeAddress>()
            .wrap_err("NODE_HOT_WALLET is not a valid paw address")?;
        let cold_wallet = env::var("NODE_COLD_WALLET")
            .map_err(|_| eyre!("NODE_COLD_WALLET environment variable is required"))?
            .parse::<NativeAddress>()
            .wrap_err("NODE_COLD_WALLET is not a valid paw address")?;
        let hot_reserve_units = parse_paw(
            &env::var("HOT_WALLET_RESERVE_PAW").unwrap_or_else(|_| "0".to_string()),
        )
        .wrap_err("HOT_WALLET_RESERVE_PAW must be a decimal PAW amount")?;

        let node = NodeConfig {
            rpc_url: env::var("NODE_RPC_URL")
                .map_err(|_| eyre!("NODE_RPC_URL environment variable is required"))?,
            ws_url: env::var("NODE_WS_URL")
                .map_err(|_| eyre!("NODE_WS_URL environment variable is required"))?,
            wallet_id: env::var("NODE_WALLET_ID")
                .map_err(|_| eyre!("NODE_WALLET_ID environment variable is required"))?,
            hot_wallet,
            cold_wallet,
            hot_reserve_units,
            hot_ratio_pct: env::var("HOT_WALLET_RATIO_PCT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_hot_ratio_pct()),
        };

        let evm = EvmConfig {
            rpc_url: env::var("EVM_RPC_URL")
                .map_err(|_| eyre!("EVM_RPC_URL environment variable is required"))?,
            chain_id: env::var("EVM_CHAIN_ID")
                .map_err(|_| eyre!("EVM_CHAIN_ID environment variable is required"))?
                .parse()
                .wrap_err("EVM_CHAIN_ID must be a valid u64")?,
            wpaw_address: env::var("WPAW_ADDRESS")
                .map_err(|_| eyre!("WPAW_ADDRESS environment variable is required"))?,
            private_key: env::var("BRIDGE_EVM_PRIVATE_KEY")
                .map_err(|_| eyre!("BRIDGE_EVM_PRIVATE_KEY environment variable is required"))?,
            confirmations: env::var("EVM_CONFIRMATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_confirmations()),
        };

        let bridge = BridgeConfig {
            api_port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_api_port()),
            blacklist_url: env::var("BLACKLIST_URL")
                .map_err(|_| eyre!("BLACKLIST_URL environment variable is required"))?,
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_sweep_interval()),
            evm_poll_interval_ms: env::var("EVM_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_evm_poll_interval()),
        };

        let config = Config {
            database,
            node,
            evm,
            bridge,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(eyre!("database.url cannot be empty"));
        }

        if self.node.rpc_url.is_empty() {
            return Err(eyre!("node.rpc_url cannot be empty"));
        }
        if self.node.ws_url.is_empty() {
            return Err(eyre!("node.ws_url cannot be empty"));
        }
        if self.node.wallet_id.is_empty() {
            return Err(eyre!("node.wallet_id cannot be empty"));
        }
        if self.node.hot_wallet == self.node.cold_wallet {
            return Err(eyre!("hot and cold wallets must be distinct accounts"));
        }
        if self.node.hot_ratio_pct > 100 {
            return Err(eyre!("node.hot_ratio_pct cannot exceed 100"));
        }

        if self.evm.rpc_url.is_empty() {
            return Err(eyre!("evm.rpc_url cannot be empty"));
        }
        if self.evm.wpaw_address.len() != 42 || !self.evm.wpaw_address.starts_with("0x") {
            return Err(eyre!(
                "evm.wpaw_address must be a valid hex address (42 chars with 0x prefix)"
            ));
        }
        if self.evm.private_key.len() != 66 || !self.evm.private_key.starts_with("0x") {
            return Err(eyre!(
                "evm.private_key must be 66 chars (0x + 64 hex chars)"
            ));
        }

        if self.bridge.blacklist_url.is_empty() {
            return Err(eyre!("bridge.blacklist_url cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
            },
            node: NodeConfig {
                rpc_url: "http://localhost:7076".to_string(),
                ws_url: "ws://localhost:7078".to_string(),
                wallet_id: "wallet-0001".to_string(),
                hot_wallet: NativeAddress::parse(
                    "paw_1hot1111111111111111111111111111111111111111111111111111qgab",
                )
                .unwrap(),
                cold_wallet: NativeAddress::parse(
                    "paw_1kold1111111111111111111111111111111111111111111111111119t8m",
                )
                .unwrap(),
                hot_reserve_units: parse_paw("100").unwrap(),
                hot_ratio_pct: 20,
            },
            evm: EvmConfig {
                rpc_url: "http://localhost:8545".to_string(),
                chain_id: 56,
                wpaw_address: "0x0000000000000000000000000000000000000001".to_string(),
                private_key:
                    "0x0000000000000000000000000000000000000000000000000000000000000001"
                        .to_string(),
                confirmations: 5,
            },
            bridge: BridgeConfig {
                api_port: 3050,
                blacklist_url: "http://localhost:9000/blacklist".to_string(),
                sweep_interval_secs: 60,
                evm_poll_interval_ms: 5000,
            },
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_confirmations(), 5);
        assert_eq!(default_api_port(), 3050);
        assert_eq!(default_sweep_interval(), 60);
        assert_eq!(default_hot_ratio_pct(), 20);
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_same_hot_cold_wallet_rejected() {
        let mut config = test_config();
        config.node.cold_wallet = config.node.hot_wallet.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_private_key_rejected() {
        let mut config = test_config();
        config.evm.private_key = "0x123".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_token_address_rejected() {
        let mut config = test_config();
        config.evm.wpaw_address = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_excessive_ratio_rejected() {
        let mut config = test_config();
        config.node.hot_ratio_pct = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = test_config();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("wallet-0001"));
        assert!(!rendered.contains("postgres://localhost/test"));
        assert!(!rendered.contains("0000000000000001"));
        assert!(rendered.contains("<redacted>"));
    }
}
