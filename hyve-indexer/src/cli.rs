use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to db.yml; defaults to $HYVE_HOME/.local/hyve/db.yml
    #[clap(short, long)]
    pub config_path: Option<String>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the ingestion pipeline, confirmation tracker, and HTTP API
    Run {
        #[clap(short, long, default_value = "0.0.0.0:8080")]
        bind: String,
        /// Seconds between poller passes
        #[clap(long, default_value_t = 10)]
        poll_interval_secs: u64,
    },
}
