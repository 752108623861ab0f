//! Cleanup command

use anyhow::Result;
use archivist_core::ArtifactKind;
use camino::Utf8Path;
use clap::Args;

use super::{build_engine, load_config, KindArg};
use crate::output;

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Only sweep this kind (both kinds by default)
    #[arg(short, long, value_enum)]
    pub kind: Option<KindArg>,

    /// Number of newest backups to keep (configured retention by default)
    #[arg(long)]
    pub keep: Option<usize>,
}

pub async fn run(args: CleanupArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let engine = build_engine(load_config(config_path)?)?;
    let kinds: Vec<ArtifactKind> = match args.kind {
        Some(kind) => vec![kind.into()],
        None => ArtifactKind::all().to_vec(),
    };

    output::header("Retention Cleanup");

    let mut total = 0;
    for kind in kinds {
        let keep = args
            .keep
            .unwrap_or_else(|| engine.config().retention.keep_for(kind));
        let deleted = engine.cleanup_old_backups(kind, keep).await?;
        total += deleted;
        output::kv(kind.as_str(), &format!("kept newest {}, deleted {}", keep, deleted));
    }
    println!();

    if total == 0 {
        output::info("Nothing to delete");
    } else {
        output::success(&format!("Deleted {} old backup(s)", total));
    }

    Ok(())
}
