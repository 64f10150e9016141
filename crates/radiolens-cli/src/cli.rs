use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "radiolens")]
#[command(
    version,
    about = "Classify a radiograph as Normal, Crack, Fracture or Hemorrhage",
    long_about = "Classify a radiograph as Normal, Crack, Fracture or Hemorrhage.\n\n\
                  Prints a single JSON document on standard output. Logs go to standard error."
)]
pub struct Cli {
    /// Image file to classify
    pub image: PathBuf,

    /// Configuration file path
    #[arg(short, long, env = "RADIOLENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// SafeTensors weights of the trained classifier
    #[arg(short, long, env = "RADIOLENS_MODEL")]
    pub model: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "RADIOLENS_LOG_FORMAT")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
