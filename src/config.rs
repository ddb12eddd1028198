use eyre::{eyre, Result, WrapErr};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::decoder::PayloadLayout;
use crate::keys::MNEMONIC_WORDS;
use crate::relay::RelayerSettings;
use crate::rpc_fallback::parse_rpc_urls;
use crate::writers::EscrowSettings;

/// Main configuration for the relayer
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub relayer: RelayerConfig,
    pub state_file: PathBuf,
    pub request_timeout_secs: u64,
    /// Health/metrics server address; `None` disables the server
    pub api_bind_addr: Option<String>,
}

/// Source chain configuration
#[derive(Clone)]
pub struct SourceConfig {
    pub algod_url: String,
    pub algod_token: String,
    /// Indexer endpoints in priority order
    pub indexer_urls: Vec<String>,
    pub indexer_token: Option<String>,
    pub log_app_id: u64,
    pub log_prefix: String,
    pub log_layout: PayloadLayout,
}

/// Custom Debug that redacts API tokens to prevent accidental log leakage.
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("algod_url", &self.algod_url)
            .field("algod_token", &"<redacted>")
            .field("indexer_urls", &self.indexer_urls)
            .field("indexer_token", &self.indexer_token.as_ref().map(|_| "<redacted>"))
            .field("log_app_id", &self.log_app_id)
            .field("log_prefix", &self.log_prefix)
            .field("log_layout", &self.log_layout)
            .finish()
    }
}

/// Destination chain configuration
#[derive(Clone)]
pub struct DestinationConfig {
    pub algod_url: String,
    pub algod_token: String,
    pub escrow_app_id: u64,
    pub asset_id: u64,
    pub admin_mnemonic: String,
    pub confirm_rounds: u64,
    pub flat_fee: u64,
    pub validity_rounds: u64,
}

/// Custom Debug that redacts the mnemonic and token.
impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("algod_url", &self.algod_url)
            .field("algod_token", &"<redacted>")
            .field("escrow_app_id", &self.escrow_app_id)
            .field("asset_id", &self.asset_id)
            .field("admin_mnemonic", &"<redacted>")
            .field("confirm_rounds", &self.confirm_rounds)
            .field("flat_fee", &self.flat_fee)
            .field("validity_rounds", &self.validity_rounds)
            .finish()
    }
}

impl DestinationConfig {
    pub fn escrow_settings(&self) -> EscrowSettings {
        EscrowSettings {
            app_id: self.escrow_app_id,
            asset_id: self.asset_id,
            flat_fee: self.flat_fee,
            confirm_rounds: self.confirm_rounds,
            validity_rounds: self.validity_rounds,
        }
    }
}

/// Relay loop configuration
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    pub page_size: u32,
    pub max_pages_per_scan: u32,
    pub poll_interval_secs: u64,
    pub min_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub empty_advance_lag: u64,
    pub start_lookback: u64,
    pub start_round: Option<u64>,
}

impl RelayerConfig {
    pub fn settings(&self) -> RelayerSettings {
        RelayerSettings {
            page_size: self.page_size,
            max_pages: self.max_pages_per_scan,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            min_backoff: Duration::from_secs(self.min_backoff_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            empty_advance_lag: self.empty_advance_lag,
            start_lookback: self.start_lookback,
            start_round: self.start_round,
        }
    }
}

/// Default functions
fn default_confirm_rounds() -> u64 {
    12
}

fn default_flat_fee() -> u64 {
    4000
}

fn default_validity_rounds() -> u64 {
    1000
}

fn default_page_size() -> u32 {
    20
}

fn default_max_pages() -> u32 {
    5
}

fn default_poll_interval() -> u64 {
    20
}

fn default_min_backoff() -> u64 {
    2
}

fn default_max_backoff() -> u64 {
    180
}

fn default_empty_advance_lag() -> u64 {
    50
}

fn default_start_lookback() -> u64 {
    4000
}

fn default_request_timeout() -> u64 {
    15
}

const DEFAULT_API_BIND_ADDR: &str = "0.0.0.0:9090";

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from a variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let indexer_urls = {
            let urls = parse_rpc_urls(&vars.optional("SOURCE_INDEXER_URLS").unwrap_or_default());
            if urls.is_empty() {
                parse_rpc_urls(&vars.optional("SOURCE_INDEXER_URL").unwrap_or_default())
            } else {
                urls
            }
        };

        let source = SourceConfig {
            algod_url: vars.required("SOURCE_ALGOD_URL")?,
            algod_token: vars.optional("SOURCE_ALGOD_TOKEN").unwrap_or_default(),
            indexer_urls,
            indexer_token: vars.optional("SOURCE_INDEXER_TOKEN"),
            log_app_id: vars.required_parse("SOURCE_LOG_APP_ID")?,
            log_prefix: vars.required("SOURCE_LOG_PREFIX")?,
            log_layout: vars.parse_or("SOURCE_LOG_LAYOUT", PayloadLayout::V4)?,
        };

        let destination = DestinationConfig {
            algod_url: vars.required("DEST_ALGOD_URL")?,
            algod_token: vars.optional("DEST_ALGOD_TOKEN").unwrap_or_default(),
            escrow_app_id: vars.required_parse("DEST_ESCROW_APP_ID")?,
            asset_id: vars.required_parse("DEST_ASSET_ID")?,
            admin_mnemonic: vars.required("DEST_ADMIN_MNEMONIC")?,
            confirm_rounds: vars.parse_or("DEST_CONFIRM_ROUNDS", default_confirm_rounds())?,
            flat_fee: vars.parse_or("DEST_FLAT_FEE", default_flat_fee())?,
            validity_rounds: vars.parse_or("DEST_VALIDITY_ROUNDS", default_validity_rounds())?,
        };

        let start_round: u64 = vars.parse_or("START_ROUND", 0)?;
        let relayer = RelayerConfig {
            page_size: vars.parse_or("INDEXER_PAGE_SIZE", default_page_size())?,
            max_pages_per_scan: vars.parse_or("MAX_PAGES_PER_SCAN", default_max_pages())?,
            poll_interval_secs: vars.parse_or("POLL_INTERVAL_SECS", default_poll_interval())?,
            min_backoff_secs: vars.parse_or("MIN_BACKOFF_SECS", default_min_backoff())?,
            max_backoff_secs: vars.parse_or("MAX_BACKOFF_SECS", default_max_backoff())?,
            empty_advance_lag: vars.parse_or("EMPTY_ADVANCE_LAG", default_empty_advance_lag())?,
            start_lookback: vars.parse_or("START_LOOKBACK", default_start_lookback())?,
            start_round: (start_round > 0).then_some(start_round),
        };

        let api_bind_addr = match vars.optional("API_BIND_ADDR") {
            Some(addr) if addr.eq_ignore_ascii_case("off") => None,
            Some(addr) => Some(addr),
            None => Some(DEFAULT_API_BIND_ADDR.to_string()),
        };

        let config = Config {
            source,
            destination,
            relayer,
            state_file: PathBuf::from(vars.required("STATE_FILE")?),
            request_timeout_secs: vars.parse_or("REQUEST_TIMEOUT_SECS", default_request_timeout())?,
            api_bind_addr,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.source.algod_url.is_empty() {
            return Err(eyre!("SOURCE_ALGOD_URL cannot be empty"));
        }

        if self.source.indexer_urls.is_empty() {
            return Err(eyre!(
                "At least one indexer endpoint is required (SOURCE_INDEXER_URLS or SOURCE_INDEXER_URL)"
            ));
        }

        if self.source.log_app_id == 0 {
            return Err(eyre!("SOURCE_LOG_APP_ID must be non-zero"));
        }

        if self.source.log_prefix.is_empty() {
            return Err(eyre!("SOURCE_LOG_PREFIX cannot be empty"));
        }

        if self.destination.algod_url.is_empty() {
            return Err(eyre!("DEST_ALGOD_URL cannot be empty"));
        }

        if self.destination.escrow_app_id == 0 {
            return Err(eyre!("DEST_ESCROW_APP_ID must be non-zero"));
        }

        if self.destination.asset_id == 0 {
            return Err(eyre!("DEST_ASSET_ID must be non-zero"));
        }

        let words = self.destination.admin_mnemonic.split_whitespace().count();
        if words != MNEMONIC_WORDS {
            return Err(eyre!(
                "DEST_ADMIN_MNEMONIC must have {} words, got {}",
                MNEMONIC_WORDS,
                words
            ));
        }

        if self.destination.confirm_rounds == 0 {
            return Err(eyre!("DEST_CONFIRM_ROUNDS must be non-zero"));
        }

        if self.relayer.page_size == 0 {
            return Err(eyre!("INDEXER_PAGE_SIZE must be non-zero"));
        }

        if self.relayer.max_pages_per_scan == 0 {
            return Err(eyre!("MAX_PAGES_PER_SCAN must be non-zero"));
        }

        if self.relayer.min_backoff_secs == 0
            || self.relayer.min_backoff_secs > self.relayer.max_backoff_secs
        {
            return Err(eyre!(
                "Backoff bounds must satisfy 0 < MIN_BACKOFF_SECS ({}) <= MAX_BACKOFF_SECS ({})",
                self.relayer.min_backoff_secs,
                self.relayer.max_backoff_secs
            ));
        }

        if self.state_file.as_os_str().is_empty() {
            return Err(eyre!("STATE_FILE cannot be empty"));
        }

        Ok(())
    }
}

/// Typed access to a variable lookup
struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Present and non-blank values only
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| eyre!("{} environment variable is required", key))
    }

    fn required_parse<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.required(key)?;
        raw.parse()
            .map_err(|e| eyre!("{} has invalid value '{}': {}", key, raw, e))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| eyre!("{} has invalid value '{}': {}", key, raw, e)),
            None => Ok(default),
        }
    }
}
