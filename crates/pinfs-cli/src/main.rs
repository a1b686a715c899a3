//! pinfs command-line client.
//!
//! Browses and edits a file tree stored in a Telegram channel.
//!
//! ## Usage
//!
//! ```bash
//! export PINFS_BOT_TOKEN=123:abc
//! pinfs --channel-id -1001234567890 ls
//! pinfs --channel-id -1001234567890 put ./notes.txt docs/notes.txt
//! pinfs --channel-id -1001234567890 cat docs/notes.txt
//! ```
//!
//! Settings come from `~/.config/pinfs/config.toml` (or `--config`), with
//! flags and environment variables taking precedence.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pinfs_core::index::{from_unix_secs, to_unix_secs};
use pinfs_core::{ChannelFs, DirEntry, FileType, Object, VfsOps};
use pinfs_telegram::{TelegramChannel, TelegramConfig};

/// Hierarchical file store in a Telegram channel.
#[derive(Parser, Debug)]
#[command(name = "pinfs")]
#[command(about = "File store backed by a Telegram channel", version)]
struct Args {
    /// Config file (default: ~/.config/pinfs/config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bot token (overrides the config file)
    #[arg(long, global = true, env = "PINFS_BOT_TOKEN", hide_env_values = true)]
    bot_token: Option<String>,

    /// Channel ID (overrides the config file)
    #[arg(long, global = true, env = "PINFS_CHANNEL_ID", allow_hyphen_values = true)]
    channel_id: Option<i64>,

    /// Path inside the channel to use as the root
    #[arg(long, global = true)]
    root: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "")]
        dir: String,
    },
    /// Show a file's metadata
    Stat { path: String },
    /// Write a file's content to stdout
    Cat { path: String },
    /// Upload a local file, replacing the content if the path exists
    Put { local: PathBuf, remote: String },
    /// Set a file's modification time, creating it empty if missing
    Touch {
        path: String,
        /// Unix timestamp in seconds (default: now)
        #[arg(long, allow_hyphen_values = true)]
        time: Option<i64>,
    },
    /// Remove a file
    Rm { path: String },
    /// Show filesystem properties
    Info,
}

/// Env-filtered stderr logging (`RUST_LOG`, default `info`).
fn registry() -> impl tracing::Subscriber + for<'span> LookupSpan<'span> + Send + Sync + 'static {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
}

#[cfg(feature = "telemetry")]
fn init_tracing() -> Option<pinfs_telemetry::OtelGuard> {
    let registry = registry();
    if !pinfs_telemetry::otel_enabled() {
        registry.init();
        return None;
    }

    match pinfs_telemetry::otel_layer("pinfs") {
        Ok((otel_layer, guard)) => {
            registry.with(otel_layer).init();
            Some(guard)
        }
        Err(e) => {
            registry.init();
            tracing::warn!(error = %e, "OTel export disabled");
            None
        }
    }
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing() {
    registry().init();
    if pinfs_telemetry::otel_enabled() {
        tracing::warn!("OTel variables set but pinfs was built without telemetry");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _otel_guard = init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pinfs: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let channel = TelegramChannel::connect(&config)
        .await
        .context("opening channel")?;
    tracing::debug!(chat_id = channel.chat_id(), "channel ready");

    let name = format!("telegram:{}", channel.chat_id());
    let fs = ChannelFs::connect(name, config.root(), Arc::new(channel))
        .await
        .context("loading index")?;

    match args.command {
        Command::Ls { dir } => cmd_ls(&fs, &dir).await,
        Command::Stat { path } => cmd_stat(&fs, &path).await,
        Command::Cat { path } => cmd_cat(&fs, &path).await,
        Command::Put { local, remote } => cmd_put(&fs, &local, &remote).await,
        Command::Touch { path, time } => cmd_touch(&fs, &path, time).await,
        Command::Rm { path } => cmd_rm(&fs, &path).await,
        Command::Info => cmd_info(&fs),
    }
}

/// Config file overlaid with flags.
fn load_config(args: &Args) -> Result<TelegramConfig> {
    let file = TelegramConfig::load_or_default(args.config.as_deref())?;
    let flags = TelegramConfig {
        bot_token: args.bot_token.clone(),
        channel_id: args.channel_id,
        root: args.root.clone(),
        ..TelegramConfig::default()
    };
    Ok(file.merge(flags))
}

fn format_entry(entry: &DirEntry) -> String {
    match entry.kind {
        FileType::Directory => format!(
            "d {:>12} {:>12} {}/",
            "-",
            to_unix_secs(entry.mtime),
            entry.name
        ),
        FileType::File => format!(
            "- {:>12} {:>12} {}",
            entry.size,
            to_unix_secs(entry.mtime),
            entry.name
        ),
    }
}

fn print_object(object: &Object) {
    println!("path:     {}", object.remote());
    println!("key:      {}", object.key());
    println!("size:     {}", object.size());
    println!("modified: {}", to_unix_secs(object.mod_time()));
}

async fn cmd_ls(fs: &ChannelFs, dir: &str) -> Result<()> {
    let entries = fs.list(dir).await?;
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

async fn cmd_stat(fs: &ChannelFs, path: &str) -> Result<()> {
    let object = fs.stat(path).await?;
    print_object(&object);
    Ok(())
}

async fn cmd_cat(fs: &ChannelFs, path: &str) -> Result<()> {
    let mut reader = fs.open(path).await?;
    let mut stdout = tokio::io::stdout();
    tokio::io::copy(&mut reader, &mut stdout)
        .await
        .with_context(|| format!("reading {path}"))?;
    Ok(())
}

async fn cmd_put(fs: &ChannelFs, local: &std::path::Path, remote: &str) -> Result<()> {
    let metadata = tokio::fs::metadata(local)
        .await
        .with_context(|| format!("reading {}", local.display()))?;
    if !metadata.is_file() {
        bail!("{} is not a regular file", local.display());
    }
    let mod_time = metadata.modified().unwrap_or_else(|_| SystemTime::now());
    let mut file = tokio::fs::File::open(local)
        .await
        .with_context(|| format!("opening {}", local.display()))?;

    let object = if fs.exists(remote).await {
        fs.update(remote, &mut file, metadata.len()).await?;
        fs.set_mod_time(remote, mod_time).await?
    } else {
        fs.put(remote, &mut file, metadata.len(), mod_time).await?
    };
    tracing::info!(path = object.remote(), size = object.size(), "stored");
    Ok(())
}

async fn cmd_touch(fs: &ChannelFs, path: &str, time: Option<i64>) -> Result<()> {
    let mod_time = time.map(from_unix_secs).unwrap_or_else(SystemTime::now);
    if fs.exists(path).await {
        fs.set_mod_time(path, mod_time).await?;
    } else {
        let mut empty: &[u8] = &[];
        fs.put(path, &mut empty, 0, mod_time).await?;
    }
    Ok(())
}

async fn cmd_rm(fs: &ChannelFs, path: &str) -> Result<()> {
    fs.remove(path).await?;
    tracing::info!(path, "removed");
    Ok(())
}

fn cmd_info(fs: &ChannelFs) -> Result<()> {
    println!("name:      {}", fs.name());
    println!("root:      {}", fs.root());
    println!("precision: {:?}", fs.precision());
    println!("hashes:    {}", fs.hashes());
    println!("index:     message {}", fs.index_message());
    println!("files:     {}", fs.file_count());
    Ok(())
}
