use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "oplog",
    about = "oplog: append-only replicated logs over a content-addressed store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding blocks, keys and oplog.toml
    #[arg(long, global = true, default_value = ".oplog")]
    pub root: PathBuf,

    /// Simultaneous block reads while loading (overrides oplog.toml)
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage writer identities
    Identity(IdentityArgs),
    /// Append payloads to a log and print its new reference
    Append(AppendArgs),
    /// Join several logs and print the merged reference
    Join(JoinArgs),
    /// Print the entries of a log
    Show(ShowArgs),
    /// Traverse the entry graph from raw entry hashes
    Fetch(FetchArgs),
}

#[derive(Args)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub action: IdentityAction,
}

#[derive(Subcommand)]
pub enum IdentityAction {
    /// Generate a signing key for a new identity
    New {
        id: String,
        /// Replace an existing key
        #[arg(long)]
        force: bool,
    },
    /// Print the public key of an identity
    Show { id: String },
}

#[derive(Args)]
pub struct AppendArgs {
    /// Identity to sign with
    #[arg(short, long)]
    pub identity: String,
    /// Log id (required unless --from is given)
    #[arg(short, long)]
    pub log: Option<String>,
    /// Reference of the log to extend
    #[arg(long)]
    pub from: Option<String>,
    /// Payloads; valid JSON is stored as JSON, anything else as a string
    #[arg(required = true)]
    pub payloads: Vec<String>,
}

#[derive(Args)]
pub struct JoinArgs {
    /// Identity the merged log belongs to
    #[arg(short, long)]
    pub identity: String,
    /// References of the logs to join
    #[arg(required = true, num_args = 2..)]
    pub references: Vec<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub reference: String,
    /// Load at most this many of the newest entries
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
    /// Print as an indented tree instead of a list
    #[arg(long)]
    pub tree: bool,
}

#[derive(Args)]
pub struct FetchArgs {
    #[arg(required = true)]
    pub hashes: Vec<String>,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
    /// Report missing blocks instead of failing
    #[arg(long)]
    pub partial: bool,
}
