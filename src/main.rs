// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use codo::{
    pack::{allowed_overlays, ALLOWED_OVERLAYS},
    path::default_state_dir,
    reconcile::Removal,
    Action, InstallOptions, ManifestStore, Observer, Reconciler, RepositoryContext,
    ResolvedPack, Settings, SourceChain, StatusReport,
};

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, MultiSelect};
use std::{
    env,
    io::{stdin, IsTerminal},
    path::PathBuf,
    process::exit,
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "codo [options] <codo-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Directory inside the repository to operate on.
    #[arg(short, long, global = true, value_name = "path")]
    pub repo: Option<PathBuf>,

    /// Directory holding manifests, backups, and settings.
    #[arg(long, global = true, env = "CODO_STATE_DIR", value_name = "path")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let ctx = self.context()?;
        match self.command {
            Command::Install(opts) => run_install(&ctx, opts),
            Command::Update(opts) => run_update(&ctx, opts),
            Command::Remove(opts) => run_remove(&ctx, opts),
            Command::Status(opts) => run_status(&ctx, opts),
        }
    }

    fn context(&self) -> Result<RepositoryContext> {
        let start = match &self.repo {
            Some(repo) => repo.clone(),
            None => env::current_dir()?,
        };
        let state_dir = match &self.state_dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => default_state_dir()?,
        };

        let ctx = RepositoryContext::discover(start, state_dir)?;
        info!(
            "repository {:?} ({}), state in {:?}",
            ctx.root().display(),
            ctx.key(),
            ctx.state_dir().display()
        );

        Ok(ctx)
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Install the pack into the repository.
    #[command(override_usage = "codo install [options]")]
    Install(InstallArgs),

    /// Update an existing installation to a newer pack.
    #[command(override_usage = "codo update [options]")]
    Update(UpdateArgs),

    /// Remove an installation, backing up managed files.
    #[command(override_usage = "codo remove [options]")]
    Remove(RemoveArgs),

    /// Report installed version and drift.
    #[command(override_usage = "codo status [options]")]
    Status(StatusArgs),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallArgs {
    /// Comma-separated overlays to layer over the base pack.
    #[arg(short, long, value_name = "names", value_delimiter = ',')]
    pub overlays: Option<Vec<String>>,

    /// Never ask for overlays interactively.
    #[arg(long)]
    pub no_prompt: bool,

    /// Pack version to install, e.g., v1.2.0.
    #[arg(long, value_name = "tag", conflicts_with = "offline")]
    pub version: Option<String>,

    /// Install the base pack built into this binary.
    #[arg(long)]
    pub offline: bool,

    /// Only report what would happen.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Leave pre-existing, differing files unmanaged.
    #[arg(long)]
    pub leave_existing: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct UpdateArgs {
    /// Pack version to update to.
    #[arg(long, value_name = "tag")]
    pub to: Option<String>,

    /// Only report what would happen.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveArgs {
    /// Only report what would happen.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StatusArgs {
    /// Fail if any managed file has drifted.
    #[arg(long)]
    pub strict: bool,
}

fn main() {
    let layer = fmt::layer().compact().with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_install(ctx: &RepositoryContext, opts: InstallArgs) -> Result<()> {
    let settings = Settings::load(ctx.settings_path())?;
    let Some(overlays) = select_overlays(&opts, &settings)? else {
        println!("aborted");
        return Ok(());
    };

    if ManifestStore::new(ctx).exists() {
        warn!("already installed, consider `codo update` instead");
    }

    let chain = if opts.offline {
        SourceChain::offline()
    } else {
        SourceChain::standard(ctx, &settings, opts.version.as_deref())
    };
    let loaded = chain.load()?;
    let version = opts.version.unwrap_or(loaded.label);
    let pack = ResolvedPack::resolve(loaded.tree, version, overlays)?;

    let observer = ConsoleObserver::new()?;
    let options = InstallOptions {
        leave_existing: opts.leave_existing,
    };
    let outcome = Reconciler::new(ctx, observer.clone())
        .dry_run(opts.dry_run)
        .install(&pack, &options)?;
    observer.finish();

    report_conflicts(ctx, outcome.attention_count());
    println!("\n{}", install_summary(pack.version(), opts.dry_run));

    Ok(())
}

fn run_update(ctx: &RepositoryContext, opts: UpdateArgs) -> Result<()> {
    let store = ManifestStore::new(ctx);
    let previous = store.open()?;
    if previous.migration_pending() {
        info!("manifest will migrate out of the repository");
    }

    let settings = Settings::load(ctx.settings_path())?;
    let loaded = SourceChain::standard(ctx, &settings, opts.to.as_deref()).load()?;
    let version = opts.to.unwrap_or(loaded.label);
    let pack = ResolvedPack::resolve(loaded.tree, version, &previous.manifest.overlays)?;

    let observer = ConsoleObserver::new()?;
    let outcome = Reconciler::new(ctx, observer.clone())
        .dry_run(opts.dry_run)
        .update(&previous.manifest, &pack)?;
    observer.finish();

    report_conflicts(ctx, outcome.attention_count());
    println!(
        "\n{}",
        update_summary(&previous.manifest.version, pack.version(), opts.dry_run)
    );

    Ok(())
}

fn run_remove(ctx: &RepositoryContext, opts: RemoveArgs) -> Result<()> {
    let previous = ManifestStore::new(ctx).open()?;

    let observer = ConsoleObserver::new()?;
    let Removal { backup_dir, .. } = Reconciler::new(ctx, observer.clone())
        .dry_run(opts.dry_run)
        .remove(&previous.manifest, Utc::now())?;
    observer.finish();

    if opts.dry_run {
        println!("\nBackup would be at {}", backup_dir.display());
    } else {
        println!("\nBackup at {}", backup_dir.display());
    }

    Ok(())
}

fn run_status(ctx: &RepositoryContext, opts: StatusArgs) -> Result<()> {
    let opened = ManifestStore::new(ctx).open()?;
    let report = StatusReport::new(ctx, &opened);
    print!("{report}");

    if opts.strict {
        report.strict()?;
    }

    Ok(())
}

/// Decide overlays for an install, or `None` if the operator aborted.
fn select_overlays(opts: &InstallArgs, settings: &Settings) -> Result<Option<Vec<String>>> {
    if let Some(overlays) = &opts.overlays {
        return Ok(Some(allowed_overlays(overlays)));
    }

    if opts.no_prompt || !settings.prompt || !stdin().is_terminal() {
        return Ok(Some(allowed_overlays(&settings.default_overlays)));
    }

    let defaults: Vec<usize> = ALLOWED_OVERLAYS
        .iter()
        .enumerate()
        .filter(|(_, name)| settings.default_overlays.iter().any(|want| want == *name))
        .map(|(index, _)| index)
        .collect();
    let chosen = MultiSelect::new("Overlays to install:", ALLOWED_OVERLAYS.to_vec())
        .with_default(&defaults)
        .prompt()?;

    let summary = if chosen.is_empty() {
        "base only".to_string()
    } else {
        chosen.join(", ")
    };
    let confirmed = Confirm::new(&format!("Install {summary}?"))
        .with_default(true)
        .prompt()?;

    Ok(confirmed.then(|| allowed_overlays(chosen)))
}

fn install_summary(version: &str, dry_run: bool) -> String {
    if dry_run {
        format!("Codo {version} would be installed.")
    } else {
        format!("Codo {version} installed.")
    }
}

fn update_summary(from: &str, to: &str, dry_run: bool) -> String {
    if dry_run {
        format!("Codo would update from {from} to {to}.")
    } else {
        format!("Codo updated from {from} to {to}.")
    }
}

fn report_conflicts(ctx: &RepositoryContext, count: usize) {
    if count > 0 {
        println!(
            "\n{count} file(s) need attention, see {}",
            ctx.report_path().display()
        );
    }
}

/// Print action lines without tearing the progress spinner.
#[derive(Debug, Clone)]
struct ConsoleObserver {
    bar: ProgressBar,
}

impl ConsoleObserver {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        bar.enable_steady_tick(Duration::from_millis(100));

        Ok(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Observer for ConsoleObserver {
    fn observe(&mut self, action: &Action) {
        self.bar.set_message(action.path.clone());
        self.bar.suspend(|| println!("{action}"));
    }
}
