use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod content_type;
mod s3;
mod tool;
mod upload;

#[derive(Parser)]
#[command(name = "s3send")]
#[command(version, about = "Upload files to S3-compatible object storage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (falls back to environment variables)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Disable SSL certificate verification
    #[arg(long, global = true)]
    insecure: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file, print its public URL to stdout
    Put {
        /// Path of the file to upload
        file: PathBuf,
    },

    /// Serve upload requests as line-delimited JSON over stdio
    Serve,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries only the resulting URL
    // (put) or JSON responses (serve).
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.insecure {
        std::env::set_var("S3SEND_INSECURE_TLS", "true");
    }

    // One-shot uploads run on a current-thread runtime; the long-running
    // tool server gets the multi-threaded one.
    let is_serve = matches!(cli.command, Commands::Serve);

    let runtime = if is_serve {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
    } else {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
    };

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref(), cli.profile.as_deref())?;

    let profile = config
        .get_profile(cli.profile.as_deref())
        .ok_or_else(|| anyhow::anyhow!("No profile found in configuration"))?;

    let uploader = upload::Uploader::new(profile, config.upload.clone());

    match cli.command {
        Commands::Put { file } => {
            let url = uploader.upload(&file).await?;
            println!("{}", url);
        }
        Commands::Serve => {
            tool::run(&uploader).await?;
        }
    }

    Ok(())
}
