//! Command line and environment configuration.
//!
//! Every option can also come from an environment variable; `.env` files are
//! loaded by the binaries before parsing.

use clap::{Parser, ValueEnum};
use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::local_store::LocalStore;
use crate::schema::DEFAULT_SHEET_NAME;
use crate::sheets::{AuthorizedUserToken, SheetsClient};
use crate::store::SharedStore;

pub const DEFAULT_SPREADSHEET_ID: &str = "1VLDQUCO3Aw4ClAvhjkUsnBxG44BTjz-MjHK04OqPxYM";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Google Sheets over the REST API.
    Sheets,
    /// A gzip'd sheet file on local disk.
    Local,
}

/// Oil sample intake form
#[derive(Parser, Debug, Clone)]
#[command(name = "oil-sample-intake")]
#[command(about = "Oil sample collection form backed by a spreadsheet")]
pub struct Args {
    /// Address the web server listens on
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Where records are kept
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value_t = Backend::Sheets)]
    pub backend: Backend,

    /// Google spreadsheet id
    #[arg(long, env = "SPREADSHEET_ID", default_value = DEFAULT_SPREADSHEET_ID)]
    pub spreadsheet_id: String,

    /// Worksheet holding the records
    #[arg(long, env = "SHEET_NAME", default_value = DEFAULT_SHEET_NAME)]
    pub sheet_name: String,

    /// Authorized-user token file (falls back to GOOGLE_OAUTH_TOKEN)
    #[arg(long, env = "GOOGLE_TOKEN_FILE", default_value = "token.json")]
    pub token_file: PathBuf,

    /// Sheet file used by the local backend
    #[arg(long, env = "LOCAL_SHEET_FILE", default_value = "database/amostras.bin.gz")]
    pub local_sheet: PathBuf,

    /// Timeout for each request to the sheet API, in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Directory served under /static
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sheet_name.trim().is_empty() {
            return Err(ConfigError::Invalid("sheet name is empty".to_string()));
        }
        if self.backend == Backend::Sheets && self.spreadsheet_id.trim().is_empty() {
            return Err(ConfigError::Invalid("spreadsheet id is empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request timeout must be positive".to_string(),
            ));
        }
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Build the configured store. Blocking: call outside any async runtime.
    pub fn open_store(&self) -> Result<SharedStore, ConfigError> {
        match self.backend {
            Backend::Sheets => {
                let token = AuthorizedUserToken::load(&self.token_file)?;
                let client = SheetsClient::new(
                    &self.spreadsheet_id,
                    token,
                    Some(self.token_file.clone()),
                    Duration::from_millis(self.request_timeout_ms),
                )?;
                info!(
                    "using Google sheet {} ({})",
                    self.spreadsheet_id, self.sheet_name
                );
                Ok(Box::new(client))
            }
            Backend::Local => {
                let store = LocalStore::open(&self.local_sheet, &self.sheet_name).map_err(|e| {
                    ConfigError::Invalid(format!("{}: {}", self.local_sheet.display(), e))
                })?;
                info!("using local sheet {}", self.local_sheet.display());
                Ok(Box::new(store))
            }
        }
    }
}

/// Install the logger. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str) {
    let default_filter = format!("sample_intake={},info", level);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}
