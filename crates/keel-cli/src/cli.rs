use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "keel", about = "Keel channel service and snapshot tools", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the channel API server
    Serve(ServeArgs),
    /// Print the records in a channel snapshot file
    Dump(DumpArgs),
    /// Compute the content ETag of a JSON document
    Hash(HashArgs),
    /// Generate traceparent values
    TraceId(TraceIdArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Snapshot file for channel records
    #[arg(long, conflicts_with = "in_memory")]
    pub db: Option<PathBuf>,
    /// Keep channels in memory only
    #[arg(long)]
    pub in_memory: bool,
    /// fsync every snapshot write
    #[arg(long)]
    pub sync: bool,
}

#[derive(Args)]
pub struct DumpArgs {
    #[arg(long, default_value = "channels.db")]
    pub db: PathBuf,
}

#[derive(Args)]
pub struct HashArgs {
    /// JSON file to hash; reads stdin when omitted
    pub file: Option<PathBuf>,
    /// Parse the document as a channel first, matching the server's ETag
    #[arg(long)]
    pub channel: bool,
}

#[derive(Args)]
pub struct TraceIdArgs {
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,
}
