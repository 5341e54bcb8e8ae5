//! Tagsync CLI
//!
//! Command-line client for a local tagsync replica.
//!
//! # Commands
//!
//! - `tag` - Add or remove a tag on an address or transaction
//! - `annotate` - Replace the tags and note of a record
//! - `remove` - Remove a record
//! - `list` - List live records
//! - `pending` - Print the diff waiting to be pushed
//! - `status` - Display replica state
//! - `import` / `export` - Move datasets in and out
//! - `push` - Enable, disable or toggle pushing
//! - `sync` - Run one sync attempt
//! - `watch` - Keep syncing in the background until interrupted

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tagsync_engine::SyncConfig;
use tagsync_protocol::CollectionKind;
use tracing_subscriber::EnvFilter;

/// Offline-first tags and notes for addresses and transactions.
#[derive(Parser)]
#[command(name = "tagsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the replica directory
    #[arg(global = true, short, long, env = "TAGSYNC_PATH", default_value = ".tagsync")]
    path: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Base URL of the sync endpoint
    #[arg(global = true, long, env = "TAGSYNC_SYNC_API")]
    sync_api: Option<String>,

    /// Base URL of the user endpoint
    #[arg(global = true, long, env = "TAGSYNC_SYNC_USER_API")]
    sync_user_api: Option<String>,

    /// Allow tags and notes to be pushed
    #[arg(global = true, long)]
    access_tags_notes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add or remove a tag
    Tag {
        #[command(subcommand)]
        op: TagOp,
    },

    /// Replace the tags and note of a record
    Annotate {
        /// Address or transaction id
        id: String,

        /// Tag to set (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Note to set
        #[arg(short, long, default_value = "")]
        note: String,

        /// Target a transaction instead of an address
        #[arg(long)]
        tx: bool,
    },

    /// Remove a record
    Remove {
        /// Record id
        id: String,

        /// Target a transaction instead of an address
        #[arg(long, conflicts_with = "tag_record")]
        tx: bool,

        /// Target a tag of the vocabulary
        #[arg(long)]
        tag_record: bool,
    },

    /// List live records
    List {
        /// List transactions
        #[arg(long, conflicts_with = "tags")]
        tx: bool,

        /// List the tag vocabulary
        #[arg(long)]
        tags: bool,
    },

    /// Print the pending push diff as JSON
    Pending,

    /// Display replica state
    Status,

    /// Import a dataset JSON file
    Import {
        /// Dataset file
        file: PathBuf,

        /// Replace local state instead of merging
        #[arg(long)]
        replace: bool,
    },

    /// Print live records as a dataset JSON
    Export,

    /// Enable, disable or toggle pushing local changes
    Push {
        /// New setting
        #[arg(value_enum)]
        mode: PushMode,
    },

    /// Run one sync attempt
    Sync,

    /// Sync in the foreground until interrupted
    Watch,
}

#[derive(Subcommand)]
enum TagOp {
    /// Add a tag
    Add {
        /// Address or transaction id
        id: String,
        /// Tag label
        tag: String,
        /// Target a transaction instead of an address
        #[arg(long)]
        tx: bool,
    },
    /// Remove a tag
    Remove {
        /// Address or transaction id
        id: String,
        /// Tag label
        tag: String,
        /// Target a transaction instead of an address
        #[arg(long)]
        tx: bool,
    },
}

/// Setting for the push toggle.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PushMode {
    /// Push local changes
    On,
    /// Pull only
    Off,
    /// Flip the current setting
    Toggle,
}

impl PushMode {
    fn requested(self) -> Option<bool> {
        match self {
            PushMode::On => Some(true),
            PushMode::Off => Some(false),
            PushMode::Toggle => None,
        }
    }
}

fn annotated(tx: bool) -> CollectionKind {
    if tx {
        CollectionKind::Transactions
    } else {
        CollectionKind::Addresses
    }
}

impl Cli {
    fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::default().with_access_tags_notes(self.access_tags_notes);
        config.sync_api = self.sync_api.clone();
        config.sync_user_api = self.sync_user_api.clone();
        config
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.sync_config();
    let path = cli.path;
    match cli.command {
        Commands::Tag { op } => match op {
            TagOp::Add { id, tag, tx } => commands::annotate::add_tag(&path, annotated(tx), &id, &tag)?,
            TagOp::Remove { id, tag, tx } => {
                commands::annotate::remove_tag(&path, annotated(tx), &id, &tag)?
            }
        },
        Commands::Annotate { id, tags, note, tx } => {
            commands::annotate::replace(&path, annotated(tx), &id, tags, note)?;
        }
        Commands::Remove { id, tx, tag_record } => {
            let target = if tag_record {
                CollectionKind::Tags
            } else {
                annotated(tx)
            };
            commands::annotate::remove(&path, target, &id)?;
        }
        Commands::List { tx, tags } => {
            let target = if tags {
                CollectionKind::Tags
            } else {
                annotated(tx)
            };
            commands::show::list(&path, target)?;
        }
        Commands::Pending => commands::show::pending(&path)?,
        Commands::Status => commands::show::status(&path, &config)?,
        Commands::Import { file, replace } => commands::data::import(&path, &file, replace)?,
        Commands::Export => commands::data::export(&path)?,
        Commands::Push { mode } => commands::sync::set_push(&path, mode.requested())?,
        Commands::Sync => commands::sync::run_once(&path, config)?,
        Commands::Watch => commands::sync::watch(&path, config)?,
    }

    Ok(())
}
