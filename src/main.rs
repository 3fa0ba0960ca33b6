//! `chart-audit` command line.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;

use chart_audit::audit::{write_report, AuditError, Auditor};
use chart_audit::config::{self, AuditSettings};
use chart_audit::db::{open_database, SqliteIrpStore, SqliteRecordStore};
use chart_audit::llm::OllamaClient;
use chart_audit::org_config::load_org_config;
use chart_audit::pipeline::ingest::ingest_job;
use chart_audit::pipeline::irp::process_irp_documents;
use chart_audit::pipeline::ocr::ObjectStorePageSource;
use chart_audit::storage::FsObjectStore;

#[derive(Parser, Debug)]
#[command(name = "chart-audit", version, about = "Audit OCR'd clinical charts against organization rules")]
struct Cli {
    /// Data directory holding the object store and database [default: ~/ChartAudit]
    #[arg(long, global = true, env = "CHART_AUDIT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// SQLite database path [default: <data-dir>/chart-audit.db]
    #[arg(long, global = true, env = "CHART_AUDIT_DB")]
    db: Option<PathBuf>,

    /// Ollama-compatible server URL
    #[arg(long, global = true, env = "CHART_AUDIT_OLLAMA_URL")]
    ollama_url: Option<String>,

    /// Model used for rule evaluation
    #[arg(long, global = true, env = "CHART_AUDIT_MODEL")]
    model: Option<String>,

    /// Per-request timeout for model calls, in seconds
    #[arg(long, global = true, env = "CHART_AUDIT_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Rules evaluated concurrently per encounter
    #[arg(long, global = true, env = "CHART_AUDIT_MAX_WORKERS")]
    max_workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn a finished OCR job into encounter files
    Ingest {
        #[arg(long)]
        org: String,
        #[arg(long)]
        job_id: String,
        /// Object key of the scanned source document
        #[arg(long)]
        source_key: String,
    },
    /// Validate every waiting encounter and write the run report
    Validate {
        #[arg(long)]
        org: String,
    },
    /// Store IRP documents waiting in the IRP processed folder
    Irp {
        #[arg(long)]
        org: String,
    },
    /// Rebuild the CSV report of an earlier run
    Report {
        #[arg(long)]
        org: String,
        #[arg(long)]
        run_id: String,
    },
}

impl Cli {
    fn settings(&self) -> Result<AuditSettings, AuditError> {
        let data_dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => config::app_data_dir().ok_or(AuditError::NoHomeDir)?,
        };
        let mut settings = AuditSettings::under(data_dir);
        if let Some(db) = &self.db {
            settings.database_path = db.clone();
        }
        if let Some(url) = &self.ollama_url {
            settings.ollama_url = url.clone();
        }
        if let Some(model) = &self.model {
            settings.engine.model = model.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            settings.timeout_secs = timeout;
        }
        if let Some(workers) = self.max_workers {
            settings.engine.max_workers = workers;
        }
        Ok(settings)
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::warn!(error = %e, "Cannot render result"),
    }
}

fn ensure_dir(path: &std::path::Path) -> Result<(), AuditError> {
    std::fs::create_dir_all(path).map_err(|source| AuditError::DataDir {
        path: path.to_path_buf(),
        source,
    })
}

fn run(cli: Cli) -> Result<(), AuditError> {
    let settings = cli.settings()?;
    ensure_dir(&settings.store_root)?;
    if let Some(parent) = settings.database_path.parent() {
        ensure_dir(parent)?;
    }
    let store = FsObjectStore::new(&settings.store_root);

    match cli.command {
        Command::Ingest { org, job_id, source_key } => {
            let config = load_org_config(&store, &org)?;
            let pages = ObjectStorePageSource::new(&store, config::OCR_RESULTS_PREFIX);
            let outcome = ingest_job(&store, &pages, &job_id, &source_key, &org, &config.chart, Utc::now())?;
            match outcome {
                Some(outcome) => print_json(&outcome),
                None => println!("OCR job {job_id} did not succeed; nothing ingested"),
            }
        }
        Command::Validate { org } => {
            let records = SqliteRecordStore::new(open_database(&settings.database_path)?);
            let irps = SqliteIrpStore::new(open_database(&settings.database_path)?);
            let client = OllamaClient::new(&settings.ollama_url, settings.timeout_secs)?;
            let auditor = Auditor {
                store: &store,
                records: &records,
                irps: Some(&irps),
                client: &client,
                settings: settings.engine.clone(),
            };
            print_json(&auditor.run_validation(&org)?);
        }
        Command::Irp { org } => {
            let config = load_org_config(&store, &org)?;
            let irps = SqliteIrpStore::new(open_database(&settings.database_path)?);
            print_json(&process_irp_documents(&store, &irps, &config)?);
        }
        Command::Report { org, run_id } => {
            let records = SqliteRecordStore::new(open_database(&settings.database_path)?);
            let key = write_report(&store, &records, &org, &run_id)?;
            println!("{key}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    chart_audit::init_tracing();
    let cli = Cli::parse();
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
