use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "emotion-detect", about = "Predict the emotion expressed in an audio clip")]
pub struct Cli {
    /// Audio file to classify once and exit. Without it, the web service starts.
    pub input: Option<PathBuf>,

    /// Print the 40-element feature vector as JSON instead of a label
    #[arg(long)]
    pub features_only: bool,

    /// Address to bind the web service to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    pub port: u16,

    /// Directory uploaded clips are saved to (created if missing)
    #[arg(long, default_value = "uploads")]
    pub uploads_dir: PathBuf,

    /// Keep uploaded clips after the request completes
    #[arg(long)]
    pub keep_uploads: bool,

    /// Pre-trained classifier artifact (JSON)
    #[arg(short, long, default_value = "model.json")]
    pub model: PathBuf,

    /// Per-request limit on feature extraction, in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Maximum upload size in megabytes
    #[arg(long, default_value_t = 25)]
    pub max_upload_mb: usize,

    /// Config file (defaults to ./emotion-detect.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
