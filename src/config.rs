use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::data::provider::DEFAULT_TRONGRID_URL;
use crate::data::tronscan::{DEFAULT_FX_URL, DEFAULT_TRONSCAN_URL};

/// Default page size requested from the indexer.
pub const DEFAULT_PAGE_SIZE: u32 = 200;
/// Default cap on transfers accumulated across pages.
pub const DEFAULT_MAX_COUNT: usize = 2000;
/// Default number of records classified at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// TTL for each metadata cache namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub verified_tokens_ttl: Duration,
    pub fx_rate_ttl: Duration,
    pub contract_info_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            verified_tokens_ttl: Duration::from_secs(60), // prices move
            fx_rate_ttl: Duration::from_secs(24 * 3600), // published daily
            contract_info_ttl: Duration::from_secs(5 * 24 * 3600), // rarely changes
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub page_size: u32,
    pub classify_concurrency: usize,
    pub cache: CachePolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            classify_concurrency: DEFAULT_CONCURRENCY,
            cache: CachePolicy::default(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "tron-ledger", version, about = "TRON wallet history and token metadata")]
pub struct Config {
    /// TronGrid endpoint URL
    #[arg(long, env = "TRONGRID_API", default_value = DEFAULT_TRONGRID_URL, global = true)]
    pub trongrid_url: String,

    /// TronGrid API key
    #[arg(long, env = "TRONGRID_API_KEY", global = true, hide_env_values = true)]
    pub trongrid_api_key: Option<String>,

    /// TronScan API base URL
    #[arg(long, env = "TRONSCAN_API", default_value = DEFAULT_TRONSCAN_URL, global = true)]
    pub tronscan_url: String,

    /// TronScan API key
    #[arg(long, env = "TRONSCAN_API_KEY", global = true, hide_env_values = true)]
    pub tronscan_api_key: Option<String>,

    /// Exchange-rate feed URL
    #[arg(long, env = "FX_RATE_URL", default_value = DEFAULT_FX_URL, global = true)]
    pub fx_url: String,

    /// Records requested per indexer page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, global = true)]
    pub page_size: u32,

    /// Records classified concurrently per page
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY, global = true)]
    pub concurrency: usize,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            page_size: self.page_size.max(1),
            classify_concurrency: self.concurrency.max(1),
            ..PipelineSettings::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect a wallet's transfer history across pages
    History {
        /// Wallet address (base58 or hex)
        wallet: String,
        /// Stop requesting pages after this many transfers
        #[arg(long, default_value_t = DEFAULT_MAX_COUNT)]
        max_count: usize,
        /// Resume the native feed from this cursor
        #[arg(long, conflicts_with = "no_native")]
        cursor: Option<String>,
        /// Resume the TRC-20 feed from this cursor
        #[arg(long, conflicts_with = "no_trc20")]
        trc20_cursor: Option<String>,
        /// Skip the native feed, e.g. when it was already read to the end
        #[arg(long)]
        no_native: bool,
        /// Skip the TRC-20 token-transfer feed
        #[arg(long)]
        no_trc20: bool,
        /// Keep only transfers received by the wallet
        #[arg(long)]
        incoming: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Fetch and classify a single page of native transactions
    Page {
        /// Wallet address (base58 or hex)
        wallet: String,
        /// Cursor returned by a previous page
        #[arg(long)]
        cursor: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Fetch a single page of TRC-20 transfers
    Trc20 {
        /// Wallet address (base58 or hex)
        wallet: String,
        #[arg(long)]
        cursor: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Look up and classify one transaction by id
    Tx {
        /// Transaction id (hex)
        tx_id: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List verified tokens
    Tokens,
    /// Show metadata for a TRC-20 contract
    Contract {
        /// Contract address (base58 or hex)
        contract: String,
    },
    /// Show balances and prices for tokens held by a wallet
    Details {
        /// Wallet address (base58 or hex)
        wallet: String,
        /// Contract addresses to report; `_` for TRX
        #[arg(long = "contract", required = true)]
        contracts: Vec<String>,
    },
    /// Show the current USD/RUB rate
    Rate,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}
