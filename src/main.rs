//! Harrow - headless web application scanner
//!
//! Crawls a target, analyzes the traffic passively, runs the active scan
//! policy over the discovered nodes and prints the alerts as JSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use harrow::app::Config;
use harrow::proxy::CertificateAuthority;
use harrow::scanner::{Alert, ScanPolicy};
use harrow::scanner::active::{ScanIssue, ScanProgress};
use harrow::spider::SpiderStats;
use harrow::{ScanSession, UserHint};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Web application security scanner
#[derive(Parser, Debug)]
#[command(name = "harrow")]
#[command(author, version, about = "Web application security scanner", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HARROW_CONFIG")]
    config: Option<PathBuf>,

    /// Target URL to crawl and scan
    #[arg(short, long, env = "HARROW_TARGET")]
    target: Option<String>,

    /// Scan policy (standard, quick, full, passive)
    #[arg(short, long, env = "HARROW_POLICY")]
    policy: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "HARROW_LOG_LEVEL")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "HARROW_LOG_FORMAT")]
    log_format: LogFormat,

    /// Log file path (enables daily-rotated file logging)
    #[arg(long, env = "HARROW_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Print the default configuration and exit
    #[arg(long)]
    generate_config: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    validate_config: bool,

    /// Write a new interception CA certificate and key into this directory and exit
    #[arg(long, value_name = "DIR")]
    export_ca: Option<PathBuf>,
}

/// What a headless run prints
#[derive(Serialize)]
struct RunSummary {
    target: String,
    policy: String,
    crawl: CrawlSummary,
    scan: ScanProgress,
    issues: Vec<ScanIssue>,
    alerts: Vec<Alert>,
}

#[derive(Serialize)]
struct CrawlSummary {
    fetched: usize,
    failed: usize,
    filtered: usize,
}

impl From<SpiderStats> for CrawlSummary {
    fn from(stats: SpiderStats) -> Self {
        Self {
            fetched: stats.fetched,
            failed: stats.failed,
            filtered: stats.filtered,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.generate_config {
        return generate_default_config();
    }

    // Guard must live until exit so buffered file logs are written
    let _log_guard = init_logging(&cli)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Harrow");

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, hint = %e.user_hint(), "Invalid configuration");
            return Err(e).context("Failed to load configuration");
        }
    };

    if cli.validate_config {
        println!("Configuration is valid");
        return Ok(());
    }

    if let Some(dir) = &cli.export_ca {
        return export_ca(dir);
    }

    let Some(target) = cli.target.clone() else {
        anyhow::bail!("No target given; pass --target <URL>");
    };

    let summary = run(config, &target, cli.policy.as_deref()).await?;
    let output = serde_json::to_string_pretty(&summary).context("Failed to serialize results")?;
    println!("{}", output);

    tracing::info!("Harrow finished");
    Ok(())
}

/// Initialize the logging system
fn init_logging(cli: &Cli) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let subscriber = tracing_subscriber::registry().with(env_filter);
    let json = matches!(cli.log_format, LogFormat::Json);

    let Some(log_path) = &cli.log_file else {
        // Results go to stdout, logs to stderr
        if json {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        } else {
            subscriber.with(fmt::layer().with_writer(std::io::stderr)).init();
        }
        return Ok(None);
    };

    let dir = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Config::data_dir()
            .map(|d| d.join("logs"))
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let filename = log_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("harrow.log");

    let appender = RollingFileAppender::new(Rotation::DAILY, &dir, filename);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    if json {
        subscriber
            .with(fmt::layer().json().with_writer(writer).with_ansi(false))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .init();
    }

    Ok(Some(guard))
}

/// Print the default configuration
fn generate_default_config() -> Result<()> {
    let config = Config::default();
    let toml = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;

    println!("{}", toml);
    Ok(())
}

fn export_ca(dir: &Path) -> Result<()> {
    let ca = CertificateAuthority::new().context("Failed to generate CA certificate")?;
    let cert_path = dir.join("harrow-ca.pem");
    ca.save_to_files(&cert_path, &dir.join("harrow-ca.key"))
        .context("Failed to write CA files")?;
    println!("{}", cert_path.display());
    Ok(())
}

/// Crawl, passive and active scan of one target
async fn run(mut config: Config, target: &str, policy: Option<&str>) -> Result<RunSummary> {
    if let Some(policy) = policy {
        config.scanner.policy = policy.to_string();
    }
    let policy = ScanPolicy::from_config(&config.scanner).context("Invalid scan policy")?;

    let session = ScanSession::connect(config, Some(target)).context("Failed to start scan session")?;
    let spider = session.spider();
    let scanner = session.active_scanner(policy.clone());

    // Ctrl+C ends the crawl and the scan at their next checkpoint
    let stop = {
        let spider = spider.clone();
        let control = scanner.control();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, stopping");
                spider.stop();
                control.stop();
            }
        })
    };

    let crawl = spider
        .crawl(target)
        .await
        .with_context(|| format!("Failed to crawl {}", target))?;
    session.flush().await;

    let report = scanner.scan(session.scan_nodes()).await.context("Active scan failed")?;
    session.flush().await;
    stop.abort();

    for issue in &report.issues {
        tracing::warn!(
            plugin = %issue.plugin,
            url = %issue.url,
            kind = ?issue.kind,
            detail = %issue.detail,
            "Could not complete test"
        );
    }

    let (logged_in, logged_out) = session.auth_counts();
    tracing::info!(
        alerts = session.alerts().len(),
        passive_processed = session.passive_processed(),
        logged_in,
        logged_out,
        "Scan complete"
    );

    Ok(RunSummary {
        target: target.to_string(),
        policy: policy.name,
        crawl: crawl.into(),
        scan: report.progress,
        issues: report.issues,
        alerts: session.alerts(),
    })
}
