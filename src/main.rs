mod audio;
mod classifier;
mod cli;
mod config;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use audio::extract::extract;
use classifier::Classifier;
use cli::Cli;
use server::error::AnalyzeError;
use server::uploads::UploadStore;
use server::{AppState, ServerSettings};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    if let Some(ref path) = config::find_config(cli.config.as_deref()) {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.host == config::default_host() { cli.host = cfg.server.host; }
            if cli.port == config::default_port() { cli.port = cfg.server.port; }
            if cli.timeout_secs == config::default_timeout_secs() { cli.timeout_secs = cfg.server.timeout_secs; }
            if cli.max_upload_mb == config::default_max_upload_mb() { cli.max_upload_mb = cfg.server.max_upload_mb; }
            if cli.uploads_dir == config::default_uploads_dir() { cli.uploads_dir = cfg.storage.uploads_dir; }
            if !cli.keep_uploads { cli.keep_uploads = cfg.storage.keep_uploads; }
            if cli.model == config::default_model_path() { cli.model = cfg.model.path; }
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    if let Some(ref input) = cli.input {
        return run_once(input, &cli);
    }

    let model = classifier::load_model(&cli.model)
        .with_context(|| format!("Failed to load classifier from {}", cli.model.display()))?;
    let uploads = UploadStore::open(&cli.uploads_dir, cli.keep_uploads)?;

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.host, cli.port))?;

    let state = AppState {
        classifier: Arc::new(model),
        uploads: Arc::new(uploads),
        timeout: Duration::from_secs(cli.timeout_secs),
    };
    let settings = ServerSettings {
        addr,
        max_upload_bytes: cli.max_upload_mb * 1024 * 1024,
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(server::run(state, settings))
}

/// Classify a single file from the command line and print the result.
fn run_once(input: &Path, cli: &Cli) -> Result<()> {
    let output = describe_file(input, cli.features_only, &cli.model)?;
    println!("{}", output);
    Ok(())
}

/// The line one-shot mode prints: the predicted label, or the feature vector
/// as JSON when `features_only` is set.
fn describe_file(input: &Path, features_only: bool, model_path: &Path) -> Result<String> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    let features = extract(input, true)
        .map_err(|err| anyhow::anyhow!(AnalyzeError::from(err).user_message()))?;

    if features_only {
        return Ok(serde_json::to_string(&features)?);
    }

    let model = classifier::load_model(model_path)
        .with_context(|| format!("Failed to load classifier from {}", model_path.display()))?;
    model
        .predict_one(&features)
        .map_err(|err| anyhow::anyhow!(AnalyzeError::from(err).user_message()))
}
