use std::io::Read;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use keel_server::{Channel, ChannelMeta, KeelServer, ServerConfig};
use keel_store::{SnapshotStore, SyncMode};
use keel_types::TraceParent;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Dump(args) => cmd_dump(args, cli.format),
        Command::Hash(args) => cmd_hash(args, cli.format),
        Command::TraceId(args) => cmd_trace_id(args),
    }
}

fn server_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(db) = &args.db {
        config.snapshot_path = Some(db.clone());
    }
    if args.in_memory {
        config.snapshot_path = None;
    }
    if args.sync {
        config.snapshot.sync_mode = SyncMode::EveryWrite;
    }
    Ok(config)
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = server_config(&args)?;
    debug!(?config, "resolved server config");
    let server = KeelServer::new(config).context("failed to open channel store")?;
    match server.channels().path() {
        Some(path) => println!(
            "{} Loaded {} channel(s) from {}",
            "✓".green().bold(),
            server.channels().len().to_string().bold(),
            path.display()
        ),
        None => println!("{} Channels kept in memory only", "!".yellow().bold()),
    }
    println!("Listening on {}", format!("http://{}", server.config().bind_addr).cyan());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn cmd_dump(args: DumpArgs, format: OutputFormat) -> anyhow::Result<()> {
    if !args.db.exists() {
        anyhow::bail!("snapshot not found: {}", args.db.display());
    }
    let store: SnapshotStore<ChannelMeta> = SnapshotStore::open(&args.db, Default::default())
        .with_context(|| format!("failed to read {}", args.db.display()))?;

    let mut metas: Vec<ChannelMeta> = store.entries().into_values().collect();
    metas.sort_by(|a, b| a.id.cmp(&b.id));

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&metas)?),
        OutputFormat::Text => {
            println!("{} channel(s) in {}", metas.len().to_string().bold(), args.db.display());
            for meta in &metas {
                println!(
                    "  {}  {}  {}  {}",
                    meta.id.yellow(),
                    meta.etag.short_hex().dimmed(),
                    meta.last_modified.to_rfc3339(),
                    meta.channel.name
                );
            }
        }
    }
    Ok(())
}

fn read_input(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// ETag of a JSON document.
///
/// With `as_channel` the document is decoded as a [`Channel`] first, so the
/// result equals what the server assigns to the same body.
fn document_etag(text: &str, as_channel: bool) -> anyhow::Result<keel_types::Digest> {
    let digest = if as_channel {
        let channel: Channel = serde_json::from_str(text).context("not a valid channel")?;
        keel_crypto::etag(&channel)?
    } else {
        let value: serde_json::Value = serde_json::from_str(text).context("not valid JSON")?;
        keel_crypto::etag(&value)?
    };
    Ok(digest)
}

fn cmd_hash(args: HashArgs, format: OutputFormat) -> anyhow::Result<()> {
    let text = read_input(args.file.as_deref())?;
    let digest = document_etag(&text, args.channel)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "etag": digest })),
        OutputFormat::Text => println!("{}", digest.to_etag()),
    }
    Ok(())
}

fn cmd_trace_id(args: TraceIdArgs) -> anyhow::Result<()> {
    for _ in 0..args.count {
        println!("{}", TraceParent::generate());
    }
    Ok(())
}
