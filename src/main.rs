use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use undl_harvest::client::{decoder_for, BatchDriver, FetchSession, HttpTransport, StopReason};
use undl_harvest::config::{find_config_file, get_config, load_config, ApiKey, Config};
use undl_harvest::extract::extract_records;
use undl_harvest::models::{load_field_specs, RawRecord, SearchParameters, WireFormat};
use undl_harvest::query::compile_all;

/// UNDL Harvest - Fetch and flatten records from the UN Digital Library search API
#[derive(Parser, Debug)]
#[command(name = "undl-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch and flatten records from the UN Digital Library search API", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Wire encoding requested from the API
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    /// MARCXML
    Xml,
    /// MARC-in-JSON
    Json,
}

impl From<Format> for WireFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Xml => WireFormat::Xml,
            Format::Json => WireFormat::Json,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a paginated search and write one JSON line per record
    #[command(alias = "f")]
    Fetch {
        /// Search parameter as key=value (repeatable), e.g. -p "p=191__a:A/RES/77/*"
        #[arg(short, long = "param", value_parser = parse_param, required = true)]
        params: Vec<(String, String)>,

        /// Field extraction rules (JSON or TOML); raw records are written without it
        #[arg(long)]
        fields: Option<PathBuf>,

        /// Wire format requested from the API
        #[arg(long, value_enum, default_value_t = Format::Xml)]
        format: Format,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write raw records even when extraction rules are given
        #[arg(long)]
        raw: bool,

        /// Write the fetch log as JSON to this file
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Print the selector compiled from each extraction rule
    #[command(alias = "c")]
    Compile {
        /// Field extraction rules (JSON or TOML)
        fields: PathBuf,
    },

    /// Extract rows from raw records saved by `fetch --raw`
    #[command(alias = "x")]
    Extract {
        /// Raw records as JSON Lines or a JSON array
        records: PathBuf,

        /// Field extraction rules (JSON or TOML)
        #[arg(long)]
        fields: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Parse a `key=value` search parameter
fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(std::io::stdout().lock()))),
    }
}

/// Write each item as one JSON line
fn write_json_lines<T: serde::Serialize>(
    out: &mut dyn Write,
    items: impl IntoIterator<Item = T>,
) -> Result<usize> {
    let mut count = 0;
    for item in items {
        serde_json::to_writer(&mut *out, &item)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    out.flush()?;
    Ok(count)
}

/// Read raw records from JSON Lines, or from a single JSON array
fn read_raw_records(path: &Path) -> Result<Vec<RawRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    if content.trim_start().starts_with('[') {
        return serde_json::from_str(&content)
            .with_context(|| format!("Invalid record array in {}", path.display()));
    }

    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line)
            .with_context(|| format!("Invalid record on line {} of {}", index + 1, path.display()))?;
        records.push(record);
    }
    Ok(records)
}

/// Load configuration from the given file, a default location, or the environment
fn resolve_config(cli: &Cli) -> Result<(Config, Option<PathBuf>)> {
    let path = cli.config.clone().or_else(find_config_file);
    let config = match &path {
        Some(config_path) => load_config(config_path)?,
        None => get_config()?,
    };
    Ok((config, path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_path) = resolve_config(&cli)?;

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("undl_harvest={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    match cli.command {
        Commands::Fetch {
            params,
            fields,
            format,
            output,
            raw,
            log,
        } => {
            let specs = fields.as_deref().map(load_field_specs).transpose()?;

            let api_key = ApiKey::resolve(&config.api.credentials_path, &config.api.credential_field)?;
            let transport = HttpTransport::from_config(&config.api, api_key)?;
            tracing::debug!("Searching {}", transport.endpoint());

            let params: SearchParameters = params.into_iter().collect();
            let session = FetchSession::new(
                Arc::new(transport),
                decoder_for(format.into()),
                params,
            )
            .with_retry_config(config.rate_limit.retry_config());

            let (cancel_tx, cancel_rx) = watch::channel(false);
            let handle = BatchDriver::new(session)
                .progress_interval(config.progress.interval)
                .cancel_on(cancel_rx)
                .spawn();

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted; writing the records gathered so far");
                    let _ = cancel_tx.send(true);
                }
            });

            let result = handle.await.context("Fetch task failed")?;

            let mut out = open_output(output.as_deref())?;
            let written = match specs {
                Some(specs) if !raw => {
                    write_json_lines(&mut out, extract_records(&result.records, &specs))?
                }
                _ => write_json_lines(&mut out, &result.records)?,
            };
            tracing::info!("Wrote {} rows", written);

            if let Some(log_path) = log {
                let file = File::create(&log_path)
                    .with_context(|| format!("Failed to create {}", log_path.display()))?;
                serde_json::to_writer_pretty(BufWriter::new(file), &result.log)?;
            }

            if result.stop == StopReason::Failed {
                let reason = result
                    .log
                    .last()
                    .and_then(|entry| entry.error.clone())
                    .unwrap_or_else(|| "unknown error".to_string());
                bail!("Search stopped early: {}", reason);
            }
        }

        Commands::Compile { fields } => {
            let specs = load_field_specs(&fields)?;
            for query in compile_all(&specs) {
                println!("{}\t{}", query.name(), query.query());
            }
        }

        Commands::Extract {
            records,
            fields,
            output,
        } => {
            let specs = load_field_specs(&fields)?;
            let records = read_raw_records(&records)?;

            let mut out = open_output(output.as_deref())?;
            let written = write_json_lines(&mut out, extract_records(&records, &specs))?;
            tracing::info!("Wrote {} rows", written);
        }
    }

    Ok(())
}
