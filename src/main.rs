use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod extract;
mod fetch;
mod generate;
mod images;
mod normalize;
mod pipeline;
mod snapshot;
mod types;

#[derive(Parser)]
#[command(name = "famly-archive")]
#[command(about = "Turn a Famly feed export into a browsable static archive")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DownloadArgs {
    /// Feed export JSON (e.g. famly_feed_2025-08-29_20h25m.json)
    #[arg(value_name = "FEED_JSON")]
    input: PathBuf,
    /// Archive directory (default: derived from the export file name)
    #[arg(short, long, env = "FAMLY_ARCHIVE_OUTPUT")]
    output: Option<PathBuf>,
    /// Per-image request timeout in seconds
    #[arg(long, env = "FAMLY_ARCHIVE_TIMEOUT", default_value_t = fetch::DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every image and write metadata.json
    Download(DownloadArgs),
    /// Generate index.html and posts-only.html from metadata.json
    Generate {
        #[arg(value_name = "METADATA_JSON")]
        metadata: PathBuf,
        #[arg(short, long)]
        quiet: bool,
    },
    /// Copy the images shown on posts-only.html into post_images/
    ExtractPosts {
        #[arg(value_name = "METADATA_JSON")]
        metadata: PathBuf,
        #[arg(short, long)]
        quiet: bool,
    },
    /// Download, then generate, in one run
    Archive(DownloadArgs),
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

fn download(args: DownloadArgs) -> Result<PathBuf> {
    pipeline::run_download(
        &args.input,
        args.output,
        Duration::from_secs(args.timeout),
        args.quiet,
    )
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Download(args) => download(args).map(|_| ()),
        Commands::Generate { metadata, quiet } => generate::run_generate(&metadata, quiet),
        Commands::ExtractPosts { metadata, quiet } => extract::run_extract(&metadata, quiet),
        Commands::Archive(args) => {
            let quiet = args.quiet;
            let metadata = download(args)?;
            generate::run_generate(&metadata, quiet)
        }
    }
}
