use std::path::PathBuf;

use clap::Parser;

mod auth;
mod config;
mod context;
mod embedding;
mod errors;
mod index;
mod ingest;
mod models;
mod moderation;
mod search;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use config::Config;

#[derive(Parser)]
#[command(name = "glimpse", about = "Image similarity search and ingestion service")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Path to the YAML config file; created with defaults if missing
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,

        /// Override the bind address from the config
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the default configuration
    GenConfig,
}

pub fn parse_categories(raw: String) -> Vec<String> {
    raw.split(',')
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Serve { config, bind } => {
            let mut config = Config::load(&config);
            if let Some(bind) = bind {
                config.bind = bind;
            }
            web::start_daemon(config)
        }

        Command::GenConfig => {
            print!("{}", serde_yml::to_string(&Config::default())?);
            Ok(())
        }
    }
}
