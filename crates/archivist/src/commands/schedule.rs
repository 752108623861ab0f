//! Schedule command

use anyhow::{bail, Result};
use archivist_backup::Scheduler;
use camino::Utf8Path;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{build_engine, load_config};
use crate::output;

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Hours between automatic backups (overrides configuration)
    #[arg(long)]
    pub interval_hours: Option<u64>,
}

pub async fn run(args: ScheduleArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(hours) = args.interval_hours {
        if hours == 0 {
            bail!("--interval-hours must be at least 1");
        }
        config.schedule.interval_hours = hours;
    }

    let engine = Arc::new(build_engine(config)?);
    let scheduler = Scheduler::new(engine.clone());

    output::header("Backup Scheduler");
    output::kv("Root", &engine.root().display().to_string());
    output::kv("Interval", &format_interval(scheduler.interval()));
    output::kv("Keep", &engine.config().retention.auto.to_string());
    println!();
    output::info("Press Ctrl-C to stop");

    let handle = scheduler.start();
    tokio::signal::ctrl_c().await?;

    info!("Interrupt received, stopping scheduler");
    handle.stop();
    output::success("Scheduler stopped");

    Ok(())
}

fn format_interval(interval: Duration) -> String {
    let hours = interval.as_secs() / 3600;
    if hours == 1 {
        "every hour".to_string()
    } else {
        format!("every {} hours", hours)
    }
}
