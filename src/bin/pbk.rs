// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use pbk::{
    config::PbkConfig,
    path::{locate_config, CONFIG_FILE_NAME},
    project::{plan_transfers, sync_sections},
    sync::mirror::mirror_dirs,
    sync_dirs, SyncOptions, SyncReport,
};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{path::PathBuf, process::exit, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "pbk [options] <pbk-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Init(opts) => run_init(opts),
            Command::Sync(opts) => run_sync(opts),
            Command::SyncSections(opts) => run_sync_sections(self.config, opts),
            Command::Mirror(opts) => run_mirror(opts),
            Command::Transfer(opts) => run_transfer(self.config, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Write example configuration file to current directory.
    #[command(override_usage = "pbk init [options]")]
    Init(InitOptions),

    /// Incrementally sync source directory into target directory.
    #[command(override_usage = "pbk sync [options] <source> <target>")]
    Sync(SyncArgs),

    /// Sync shared backend into every configured section.
    #[command(override_usage = "pbk sync-sections [options] [<project>]")]
    SyncSections(ProjectOptions),

    /// Replace target directory with full copy of source directory.
    #[command(override_usage = "pbk mirror <source> <target>")]
    Mirror(MirrorOptions),

    /// Mirror project sources into shared backend.
    #[command(override_usage = "pbk transfer [options] [<project>]")]
    Transfer(ProjectOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Overwrite existing configuration without asking.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncArgs {
    /// Directory to sync from.
    #[arg(required = true, value_name = "source")]
    pub source: PathBuf,

    /// Directory to sync into.
    #[arg(required = true, value_name = "target")]
    pub target: PathBuf,

    /// Only sync files whose name contains pattern.
    #[arg(short, long = "pattern", value_name = "pattern")]
    pub patterns: Vec<String>,

    /// Keep target files whose source vanished.
    #[arg(short, long)]
    pub keep_extra: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ProjectOptions {
    /// Only act on project of this name.
    #[arg(value_name = "project")]
    pub project: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct MirrorOptions {
    /// Directory to copy from.
    #[arg(required = true, value_name = "source")]
    pub source: PathBuf,

    /// Directory to replace.
    #[arg(required = true, value_name = "target")]
    pub target: PathBuf,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_init(opts: InitOptions) -> Result<()> {
    let path = PathBuf::from(CONFIG_FILE_NAME);
    if path.exists() && !opts.force {
        let overwrite = Confirm::new(&format!("{CONFIG_FILE_NAME} already exists, overwrite it?"))
            .with_default(false)
            .prompt()?;
        if !overwrite {
            info!("leave {CONFIG_FILE_NAME} untouched");
            return Ok(());
        }
    }

    PbkConfig::example().save(&path)?;
    info!("wrote example configuration to {:?}", path.display());

    Ok(())
}

fn run_sync(opts: SyncArgs) -> Result<()> {
    let options = SyncOptions::new()
        .with_patterns(opts.patterns)
        .with_prune(!opts.keep_extra);
    let report = sync_dirs(&opts.source, &opts.target, &options)?;
    summarize(&report)
}

fn run_sync_sections(config: Option<PathBuf>, opts: ProjectOptions) -> Result<()> {
    let config = PbkConfig::load(locate_config(config.as_deref())?)?;
    let style = ProgressStyle::with_template("{spinner:.green} {elapsed_precise:.green}  {msg}")?;

    let outcomes = sync_sections(&config, opts.project.as_deref(), |job| {
        let label = format!("{} / {}", job.project, job.section);
        let bar = spinner(&style, label.clone());
        let result = bar.suspend(|| job.run());
        match &result {
            Ok(report) if report.is_clean() => {
                bar.finish_with_message(format!("{label}: {report}"));
            }
            Ok(report) => bar.abandon_with_message(format!("{label}: {report}")),
            Err(_) => bar.abandon_with_message(format!("{label}: failed")),
        }
        result
    })?;

    let mut failed = 0;
    for outcome in outcomes.into_iter().filter(|outcome| !outcome.is_success()) {
        failed += 1;
        match outcome.result {
            Ok(report) => report.failures.iter().for_each(|failure| warn!("{failure}")),
            Err(err) => error!("{:?}", anyhow!(err)),
        }
    }

    if failed > 0 {
        bail!("{failed} section(s) failed to sync");
    }

    Ok(())
}

fn run_mirror(opts: MirrorOptions) -> Result<()> {
    let count = mirror_dirs(&opts.source, &opts.target)?;
    info!(
        "copied {count} files from {:?} to {:?}",
        opts.source.display(),
        opts.target.display()
    );

    Ok(())
}

fn run_transfer(config: Option<PathBuf>, opts: ProjectOptions) -> Result<()> {
    let config = PbkConfig::load(locate_config(config.as_deref())?)?;
    for job in plan_transfers(&config, opts.project.as_deref())? {
        let count = job.run()?;
        info!("transferred {count} files of {:?} to shared backend", job.project);
    }

    Ok(())
}

fn summarize(report: &SyncReport) -> Result<()> {
    info!("{report}");
    for failure in &report.failures {
        warn!("{failure}");
    }

    if !report.is_clean() {
        bail!("{} file(s) failed to sync", report.failures.len());
    }

    Ok(())
}

fn spinner(style: &ProgressStyle, message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(style.clone());
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}
