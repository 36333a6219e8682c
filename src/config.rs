// ⚙️ Configuration - environment only
//
// Every setting comes from an environment variable with a working default, so a bare
// `family-basket` run uses a text file in the current directory and the built-in
// household. Recipe generation and mail notifications switch on when their
// credentials are present.

use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::household::Household;
use crate::logging::{LogFormat, LoggingConfig};
use crate::notify::MailRelayNotifier;
use crate::recipe::gemini::{GeminiGenerator, DEFAULT_MODEL};
use crate::recipe::DEFAULT_GENERATION_TIMEOUT;
use crate::session::Services;
use crate::store::table::DEFAULT_COLUMN;
use crate::store::{
    Backend, FileBackend, ListStore, MemoryBackend, SheetBackend, SqliteBackend, TableBackend,
};

/// Where the list lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    File { path: PathBuf },
    Table { path: PathBuf, column: String },
    Sqlite { path: PathBuf },
    Sheet {
        url: String,
        token: Option<String>,
        column: String,
        ttl: Duration,
    },
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailConfig {
    pub relay_url: String,
    pub token: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub household_file: Option<PathBuf>,
    pub gemini: Option<GeminiConfig>,
    pub generation_timeout: Duration,
    pub mail: Option<MailConfig>,
    pub bind: String,
    pub logging: LoggingConfig,
}

fn parse_secs(name: &str, value: Option<String>, default: Duration) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .with_context(|| format!("{} must be a whole number of seconds, got '{}'", name, raw)),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let column = get("BASKET_COLUMN").unwrap_or_else(|| DEFAULT_COLUMN.to_string());
        let path_or = |default: &str| PathBuf::from(get("BASKET_PATH").unwrap_or_else(|| default.to_string()));

        let backend_kind = get("BASKET_BACKEND").unwrap_or_else(|| "file".to_string());
        let backend = match backend_kind.trim().to_lowercase().as_str() {
            "file" => BackendConfig::File {
                path: path_or("shopping_list.txt"),
            },
            "csv" => BackendConfig::Table {
                path: path_or("shopping_list.csv"),
                column,
            },
            "sqlite" => BackendConfig::Sqlite {
                path: path_or("shopping_list.db"),
            },
            "sheet" => BackendConfig::Sheet {
                url: get("BASKET_SHEET_URL")
                    .ok_or_else(|| anyhow!("BASKET_SHEET_URL is required for the sheet backend"))?,
                token: get("BASKET_SHEET_TOKEN"),
                column,
                ttl: parse_secs("BASKET_SHEET_TTL_SECS", get("BASKET_SHEET_TTL_SECS"), Duration::ZERO)?,
            },
            "memory" => BackendConfig::Memory,
            other => bail!(
                "unknown BASKET_BACKEND '{}' (expected file, csv, sqlite, sheet or memory)",
                other
            ),
        };

        let gemini = get("GEMINI_API_KEY").map(|api_key| GeminiConfig {
            api_key,
            model: get("BASKET_GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        });

        let mail = match (get("BASKET_MAIL_RELAY_URL"), get("BASKET_MAIL_TO")) {
            (Some(relay_url), Some(to)) => Some(MailConfig {
                relay_url,
                token: get("BASKET_MAIL_RELAY_TOKEN"),
                from: get("BASKET_MAIL_FROM").unwrap_or_else(|| "family-basket@localhost".to_string()),
                to: to
                    .split(',')
                    .map(str::trim)
                    .filter(|address| !address.is_empty())
                    .map(str::to_string)
                    .collect(),
            }),
            _ => None,
        };

        let logging = LoggingConfig {
            level: get("BASKET_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            format: match get("BASKET_LOG_FORMAT") {
                Some(format) => format.parse()?,
                None => LogFormat::default(),
            },
            file: get("BASKET_LOG_FILE").map(PathBuf::from),
        };

        Ok(AppConfig {
            backend,
            household_file: get("BASKET_HOUSEHOLD").map(PathBuf::from),
            gemini,
            generation_timeout: parse_secs(
                "BASKET_GENERATION_TIMEOUT_SECS",
                get("BASKET_GENERATION_TIMEOUT_SECS"),
                DEFAULT_GENERATION_TIMEOUT,
            )?,
            mail,
            bind: get("BASKET_BIND").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            logging,
        })
    }

    pub fn open_backend(&self) -> Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match &self.backend {
            BackendConfig::File { path } => Arc::new(FileBackend::new(path)),
            BackendConfig::Table { path, column } => Arc::new(TableBackend::with_column(path, column)),
            BackendConfig::Sqlite { path } => Arc::new(
                SqliteBackend::open(path)
                    .with_context(|| format!("Failed to open list database: {:?}", path))?,
            ),
            BackendConfig::Sheet {
                url,
                token,
                column,
                ttl,
            } => {
                let mut sheet = SheetBackend::new(url.clone())
                    .with_column(column.clone())
                    .with_ttl(*ttl);
                if let Some(token) = token {
                    sheet = sheet.with_token(token.clone());
                }
                Arc::new(sheet)
            }
            BackendConfig::Memory => Arc::new(MemoryBackend::new()),
        };

        Ok(backend)
    }

    pub fn load_household(&self) -> Result<Household> {
        match &self.household_file {
            Some(path) => Household::from_file(path),
            None => Ok(Household::default()),
        }
    }

    /// Wire the store, household and optional collaborators together
    pub fn build_services(&self) -> Result<Services> {
        let store = ListStore::new(self.open_backend()?);
        info!(backend = %store.describe(), "Shopping list backend ready");

        let mut services = Services::new(store, self.load_household()?)
            .with_generation_timeout(self.generation_timeout);

        if let Some(gemini) = &self.gemini {
            let generator = GeminiGenerator::new(gemini.api_key.clone())
                .with_model(gemini.model.clone())
                .with_request_timeout(self.generation_timeout);
            services = services.with_generator(Arc::new(generator));
        }

        if let Some(mail) = &self.mail {
            let mut notifier =
                MailRelayNotifier::new(mail.relay_url.clone(), mail.from.clone(), mail.to.clone());
            if let Some(token) = &mail.token {
                notifier = notifier.with_token(token.clone());
            }
            services = services.with_notifier(Arc::new(notifier));
        }

        Ok(services)
    }
}

// ============================================================================
// TESTS
// ============================================================================
