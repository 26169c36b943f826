use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tt", about = concat!("tasktrees v", env!("CARGO_PKG_VERSION"), " - nested task lists that stay in sync"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Use a different data directory
    #[arg(short = 'C', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Account to sync as (default: from config.toml)
    #[arg(long, global = true)]
    pub account: Option<String>,

    /// Tree to work on
    #[arg(short = 't', long = "tree", global = true, default_value = "default")]
    pub tree: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the account's trees
    Trees,
    /// Create a new, empty tree
    New(NewArgs),
    /// Delete a tree from the store
    DeleteTree(DeleteTreeArgs),
    /// Print the tree
    Show(ShowArgs),
    /// Add an item
    Add(AddArgs),
    /// Move an item (with its subtree) under another parent
    Mv(MvArgs),
    /// Make an item the last child of the item above it
    Indent(IdArg),
    /// Move an item out to sit right after its parent
    Outdent(IdArg),
    /// Mark an item done
    Done(IdArg),
    /// Mark an item not done
    Undone(IdArg),
    /// Change an item's text
    Edit(EditArgs),
    /// Delete an item and everything under it
    Rm(IdArg),
    /// Collapse or expand an item
    Collapse(IdArg),
    /// Delete every done item
    CleanDone,
    /// Rename the tree
    Rename(RenameArgs),
    /// Write a JSON backup of the tree
    Export(ExportArgs),
    /// Replace the tree with a JSON backup
    Import(ImportArgs),
    /// Print the tree every time it changes in the store
    Watch(WatchArgs),
    /// View or edit config.toml
    Config(ConfigCmd),
    /// Inspect saved-aside payloads from failed writes and imports
    Recovery(RecoveryCmd),
}

// ---------------------------------------------------------------------------
// Tree management
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct NewArgs {
    /// Tree id (letters, digits, dashes)
    pub id: String,
    /// Display name
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct DeleteTreeArgs {
    pub id: String,
}

#[derive(Args)]
pub struct RenameArgs {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ShowArgs {
    /// Include collapsed and hidden items
    #[arg(long)]
    pub all: bool,
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

/// Items are addressed by id or any unique id prefix.
#[derive(Args)]
pub struct IdArg {
    pub id: String,
}

#[derive(Args)]
pub struct AddArgs {
    pub text: String,
    /// Parent item (default: top level)
    #[arg(long)]
    pub parent: Option<String>,
    /// Position among the parent's children (default: last)
    #[arg(long)]
    pub index: Option<usize>,
}

#[derive(Args)]
pub struct MvArgs {
    pub id: String,
    /// New parent (default: top level)
    #[arg(long)]
    pub parent: Option<String>,
    /// Position among the new parent's children (default: last)
    #[arg(long)]
    pub index: Option<usize>,
}

#[derive(Args)]
pub struct EditArgs {
    pub id: String,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ExportArgs {
    /// Directory for the backup file (default: current directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Exact output path, overriding the generated file name
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImportArgs {
    pub file: PathBuf,
}

// ---------------------------------------------------------------------------
// Watch
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct WatchArgs {
    /// Stop after this many seconds (default: run until interrupted)
    #[arg(long = "for")]
    pub for_secs: Option<u64>,
    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u64,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set the sync account, or clear it when omitted
    SetAccount { account: Option<String> },
    /// Set the save debounce in milliseconds
    SetDebounce { ms: u64 },
    /// Print the absolute path to config.toml
    Path,
}

// ---------------------------------------------------------------------------
// Recovery log
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RecoveryCmd {
    #[command(subcommand)]
    pub action: Option<RecoveryAction>,
    /// How many entries to list, newest first (default: 10)
    #[arg(long)]
    pub limit: Option<usize>,
    /// Only list entries newer than this RFC 3339 time
    #[arg(long)]
    pub since: Option<String>,
}

#[derive(Subcommand)]
pub enum RecoveryAction {
    /// Drop entries from the recovery log
    Prune(RecoveryPruneArgs),
    /// Print where the recovery log lives
    Path,
}

#[derive(Args)]
pub struct RecoveryPruneArgs {
    /// Drop entries before this RFC 3339 time (default: 30 days ago)
    #[arg(long)]
    pub before: Option<String>,
    /// Drop every entry
    #[arg(long)]
    pub all: bool,
}
