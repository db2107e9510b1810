//! Node configuration
//!
//! Loaded from environment variables, with an optional `.env` file.

use bridge_core::coordinator::DEFAULT_TRANSACTION_TIMEOUT_SECS;
use bridge_core::fee_manager::{DEFAULT_FEE_BPS, DEFAULT_MAX_AMOUNT, DEFAULT_MIN_AMOUNT};
use bridge_core::{Address, BridgeSettings, ChainId, FeeConfig};
use eyre::{eyre, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default API port (same slot as the operator API)
pub const DEFAULT_API_PORT: u16 = 9092;

/// Default interval between timeout sweeps
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 30_000;

#[derive(Clone)]
pub struct Config {
    /// Chain this node locks funds on
    pub local_chain_id: ChainId,
    /// Authorized actor for configuration and pause
    pub admin_address: String,
    /// Bearer token the API maps to `admin_address`
    pub admin_token: String,
    /// Bearer token watchers present to report locks
    pub watcher_token: String,
    /// `(validator address, bearer token)` pairs for attestation submission
    pub validator_tokens: Vec<(String, String)>,

    pub fee_bps: u32,
    pub min_amount: u128,
    pub max_amount: u128,
    pub transaction_timeout_secs: u64,

    /// JSON file with initial chains and validators
    pub genesis_path: Option<PathBuf>,

    pub api_bind_address: String,
    pub api_port: u16,
    pub sweep_interval_ms: u64,
}

/// Custom Debug that redacts every token.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("local_chain_id", &self.local_chain_id)
            .field("admin_address", &self.admin_address)
            .field("admin_token", &"<redacted>")
            .field("watcher_token", &"<redacted>")
            .field(
                "validator_tokens",
                &self
                    .validator_tokens
                    .iter()
                    .map(|(validator, _)| (validator.as_str(), "<redacted>"))
                    .collect::<Vec<_>>(),
            )
            .field("fee_bps", &self.fee_bps)
            .field("min_amount", &self.min_amount)
            .field("max_amount", &self.max_amount)
            .field("transaction_timeout_secs", &self.transaction_timeout_secs)
            .field("genesis_path", &self.genesis_path)
            .field("api_bind_address", &self.api_bind_address)
            .field("api_port", &self.api_port)
            .field("sweep_interval_ms", &self.sweep_interval_ms)
            .finish()
    }
}

/// Parse a chain ID given as decimal (`56`) or 0x-prefixed hex (`0x00000038`)
pub fn parse_chain_id(raw: &str) -> Result<ChainId> {
    let raw = raw.trim();
    let id = match raw.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse::<u32>(),
    }
    .map_err(|_| eyre!("Invalid chain id: {}", raw))?;
    Ok(ChainId::from_u32(id))
}

/// Parse `addr=token,addr=token` into validator token pairs
pub fn parse_validator_tokens(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (validator, token) = entry
                .split_once('=')
                .ok_or_else(|| eyre!("Invalid validator token entry, expected addr=token"))?;
            let (validator, token) = (validator.trim(), token.trim());
            if validator.is_empty() || token.is_empty() {
                return Err(eyre!("Invalid validator token entry, expected addr=token"));
            }
            Ok((validator.to_string(), token.to_string()))
        })
        .collect()
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(eyre!("{} required", name)),
    }
}

/// Optional value with a default; present but malformed is an error
fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| eyre!("Invalid {}: {}", name, v)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }

        let config = Self {
            local_chain_id: parse_chain_id(&required("BRIDGE_LOCAL_CHAIN_ID")?)?,
            admin_address: required("BRIDGE_ADMIN_ADDRESS")?,
            admin_token: required("BRIDGE_ADMIN_TOKEN")?,
            watcher_token: required("BRIDGE_WATCHER_TOKEN")?,
            validator_tokens: match env::var("BRIDGE_VALIDATOR_TOKENS") {
                Ok(raw) => parse_validator_tokens(&raw)
                    .map_err(|e| eyre!("Invalid BRIDGE_VALIDATOR_TOKENS: {}", e))?,
                Err(_) => Vec::new(),
            },

            fee_bps: parse_or("BRIDGE_FEE_BPS", DEFAULT_FEE_BPS)?,
            min_amount: parse_or("BRIDGE_MIN_AMOUNT", DEFAULT_MIN_AMOUNT)?,
            max_amount: parse_or("BRIDGE_MAX_AMOUNT", DEFAULT_MAX_AMOUNT)?,
            transaction_timeout_secs: parse_or(
                "BRIDGE_TX_TIMEOUT_SECS",
                DEFAULT_TRANSACTION_TIMEOUT_SECS,
            )?,

            genesis_path: env::var("BRIDGE_GENESIS_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),

            api_bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parse_or("API_PORT", DEFAULT_API_PORT)?,
            sweep_interval_ms: parse_or("SWEEP_INTERVAL_MS", DEFAULT_SWEEP_INTERVAL_MS)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.transaction_timeout_secs == 0 {
            return Err(eyre!("BRIDGE_TX_TIMEOUT_SECS must be greater than zero"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(eyre!("SWEEP_INTERVAL_MS must be greater than zero"));
        }
        if self.admin_token.len() < 16 {
            return Err(eyre!("BRIDGE_ADMIN_TOKEN must be at least 16 characters"));
        }
        if self.watcher_token.len() < 16 {
            return Err(eyre!("BRIDGE_WATCHER_TOKEN must be at least 16 characters"));
        }
        let mut tokens = vec![self.admin_token.as_str(), self.watcher_token.as_str()];
        for (validator, token) in &self.validator_tokens {
            if token.len() < 16 {
                return Err(eyre!(
                    "Token for validator {} must be at least 16 characters",
                    validator
                ));
            }
            tokens.push(token.as_str());
        }
        // A token must identify exactly one role
        tokens.sort_unstable();
        if tokens.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(eyre!("Admin, watcher and validator tokens must be distinct"));
        }
        self.fee_config()
            .validate()
            .map_err(|e| eyre!("Invalid fee configuration: {}", e))?;
        Ok(())
    }

    pub fn fee_config(&self) -> FeeConfig {
        FeeConfig {
            fee_bps: self.fee_bps,
            min_amount: self.min_amount,
            max_amount: self.max_amount,
        }
    }

    /// Validator token pairs with parsed addresses
    pub fn validator_credentials(&self) -> Result<Vec<(Address, String)>> {
        self.validator_tokens
            .iter()
            .map(|(validator, token)| {
                let address = Address::new(validator)
                    .map_err(|e| eyre!("Invalid validator in BRIDGE_VALIDATOR_TOKENS: {}", e))?;
                Ok((address, token.clone()))
            })
            .collect()
    }

    pub fn admin(&self) -> Result<Address> {
        Address::new(&self.admin_address)
            .map_err(|e| eyre!("Invalid BRIDGE_ADMIN_ADDRESS: {}", e))
    }

    /// Settings the coordinator is built from
    pub fn bridge_settings(&self) -> Result<BridgeSettings> {
        Ok(BridgeSettings {
            local_chain_id: self.local_chain_id,
            admin: self.admin()?,
            fee: self.fee_config(),
            transaction_timeout_secs: self.transaction_timeout_secs,
        })
    }
}
