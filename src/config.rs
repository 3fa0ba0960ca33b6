use std::path::PathBuf;

use crate::rules::EngineSettings;

/// Application-level constants
pub const APP_NAME: &str = "ChartAudit";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix of every environment variable the binary reads.
pub const ENV_PREFIX: &str = "CHART_AUDIT_";

pub const DATABASE_FILE: &str = "chart-audit.db";
pub const STORE_DIR: &str = "store";
pub const OCR_RESULTS_PREFIX: &str = "ocr-results/";

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Concurrent rule evaluations per encounter.
pub const DEFAULT_MAX_WORKERS: usize = 3;
/// Extra model calls after a response without JSON.
pub const DEFAULT_MAX_RETRIES: u32 = 1;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TEMPERATURE: f32 = 0.01;

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "chart_audit=info,warn"
}

/// Application data directory: `~/ChartAudit/`. `None` when the home
/// directory cannot be determined.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_NAME))
}

/// Everything a run needs besides the organization id.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditSettings {
    /// Root of the file-system object store.
    pub store_root: PathBuf,
    pub database_path: PathBuf,
    pub ollama_url: String,
    pub timeout_secs: u64,
    pub engine: EngineSettings,
}

impl AuditSettings {
    /// Defaults rooted at `data_dir`.
    pub fn under(data_dir: PathBuf) -> Self {
        Self {
            store_root: data_dir.join(STORE_DIR),
            database_path: data_dir.join(DATABASE_FILE),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            engine: EngineSettings::default(),
        }
    }
}
