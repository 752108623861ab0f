//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

pub use crate::commands::cleanup::CleanupArgs;
pub use crate::commands::create::CreateArgs;
pub use crate::commands::delete::DeleteArgs;
pub use crate::commands::list::ListArgs;
pub use crate::commands::rebuild::RebuildArgs;
pub use crate::commands::restore::RestoreArgs;
pub use crate::commands::schedule::ScheduleArgs;
pub use crate::commands::verify::VerifyArgs;

/// Archivist - backups for record collections and media trees
#[derive(Parser, Debug)]
#[command(name = "archivist")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to archivist.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a backup now
    Create(CreateArgs),

    /// List registered backups
    List(ListArgs),

    /// Restore a backup
    Restore(RestoreArgs),

    /// Delete old backups beyond the retention count
    Cleanup(CleanupArgs),

    /// Check a backup's checksum and contents
    Verify(VerifyArgs),

    /// Run periodic automatic backups until interrupted
    Schedule(ScheduleArgs),

    /// Delete one backup
    Delete(DeleteArgs),

    /// Regenerate the registry from the backup directories
    Rebuild(RebuildArgs),
}
