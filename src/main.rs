//! S3 Batch Uploader - upload local files to S3 with signed POST credentials

use anyhow::Context;
use clap::Parser;
use s3_batch_uploader::upload::{SuffixRuleSpec, UploadError, UploadListener, UploadRequest};
use s3_batch_uploader::{config::Config, metrics, telemetry, UploadManager};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// S3 Batch Uploader - sequential signed-POST uploads with progress reporting
#[derive(Parser, Debug)]
#[command(name = "s3-batch-uploader")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Key suffix rule: incremental, dimensions, or table:a,b,c
    #[arg(short, long, default_value = "incremental")]
    suffix: SuffixRuleSpec,

    /// ACL for uploaded objects (defaults to uploader.default_acl)
    #[arg(long)]
    acl: Option<String>,

    /// Print Prometheus metrics after the batch finishes
    #[arg(long)]
    print_metrics: bool,

    /// Files to upload, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

/// Reports batch events from the callback thread
struct CliListener;

impl UploadListener for CliListener {
    fn on_progress(&self, percent: u8) {
        info!(percent, "Upload progress");
    }

    fn on_upload_complete(&self, urls: Vec<String>) {
        info!(files = urls.len(), "Upload complete");
        for url in urls {
            println!("{}", url);
        }
    }

    fn on_upload_failed(&self, error: UploadError, index: usize) {
        error!(error = %error, kind = error.kind(), index, "Upload failed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    telemetry::init_subscriber(&config.logging)?;
    info!("Starting S3 Batch Uploader v{}", env!("CARGO_PKG_VERSION"));

    let suffix_rule = args.suffix.build()?;
    let (manager, callback_thread) = UploadManager::from_config(&config)?;

    let mut request = UploadRequest::new(args.files.clone()).with_suffix_rule(suffix_rule);
    request.acl = args
        .acl
        .clone()
        .unwrap_or_else(|| config.uploader.default_acl.clone());

    let listener: Arc<dyn UploadListener> = Arc::new(CliListener);
    let handle = manager.submit(request, &listener);
    let outcome = handle.wait().await?;

    // Let the callback thread drain before exiting
    drop(manager);
    tokio::task::spawn_blocking(move || callback_thread.join()).await?;

    if args.print_metrics && config.metrics.enabled {
        print!("{}", metrics::render());
    }

    info!(state = ?outcome.state, "Batch finished");
    Ok(if outcome.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
