//! bgpvpnd - BaGPipe BGPVPN driver daemon
//!
//! Reads JSON commands (one per line) from a file or stdin, applies them to
//! an in-memory store and topology, and logs every agent notification under
//! the `agent` target.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use bgpvpn_bagpipe::{
    audit_log, init_logging, AuditCategory, AuditRecord, BagpipeConfig,
    CommandProcessor, LoggingChannel, DEFAULT_CONFIG_PATH,
};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};

/// BaGPipe BGPVPN driver
#[derive(Parser, Debug)]
#[command(name = "bgpvpnd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Command file, one JSON command per line; stdin if omitted
    events: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match BagpipeConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("bgpvpnd: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = args.log_level.clone() {
        config.logging.level = level;
    }
    init_logging(&config.logging);

    info!("--- Starting bgpvpnd ---");
    info!(config = %args.config.display(), "Configuration loaded");

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "bgpvpnd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: BagpipeConfig) -> anyhow::Result<()> {
    let processor = CommandProcessor::new(LoggingChannel, config.driver);
    audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "bgpvpnd", "start"));

    let summary = match &args.events {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?;
            processor.run(BufReader::new(file)).await?
        }
        None => processor.run(BufReader::new(tokio::io::stdin())).await?,
    };

    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        malformed = summary.malformed,
        "Input exhausted"
    );
    audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "bgpvpnd", "stop")
        .with_details(serde_json::json!({
            "applied": summary.applied,
            "rejected": summary.rejected,
            "malformed": summary.malformed,
        })));
    Ok(())
}
