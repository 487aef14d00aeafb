//! prefs-export: export macOS preferences to a directory.
//!
//! Copies every preference domain under `~/Library/Preferences` into
//! `<output>/Preferences`, writes `exec-defaults.sh` (accepted keys) and
//! `rejected-defaults.sh` (filtered keys), and with `--commit` versions the
//! result with git. `install-job` schedules a daily run through launchd.

use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};

use macprefs::config::Config;
use macprefs::export::git::{GitCli, Vcs, is_git_installed};
use macprefs::export::job::install_job;
use macprefs::export::plutil::Plutil;
use macprefs::export::{ExportOptions, prefs_export};
use macprefs::logging;
use macprefs::rules::RuleSet;

#[derive(Debug, Parser)]
#[command(name = "prefs-export", about = "Export preferences.", version)]
struct Cli {
    #[command(flatten)]
    common: CommonOptions,

    /// Commit the changes with Git.
    #[arg(short, long)]
    commit: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Args)]
struct CommonOptions {
    /// Path to the configuration file.
    #[arg(short = 'C', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Key for pushing to the Git repository.
    #[arg(short = 'K', long, value_name = "KEY", global = true)]
    deploy_key: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Where to store the exported data.
    #[arg(short, long, value_name = "DIR", global = true)]
    output_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Install a launchd job that exports and commits daily.
    InstallJob,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config = self.load_config()?;
        match self.command {
            Some(Command::InstallJob) => run_install_job(&config),
            None => run_export(&config, self.json),
        }
    }

    /// Configuration file plus command-line overrides.
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.common.config.as_deref())
            .context("failed to load configuration")?;
        if let Some(dir) = &self.common.output_directory {
            config.settings.output_directory = dir.clone();
        }
        if let Some(key) = &self.common.deploy_key {
            if !key.is_file() {
                bail!("deploy key {} does not exist", key.display());
            }
            config.settings.deploy_key = Some(key.clone());
        }
        config.settings.commit |= self.commit;
        Ok(config)
    }
}

fn run_export(config: &Config, json: bool) -> Result<()> {
    let rules = RuleSet::from_config(config).context("invalid exclusion rules")?;
    let options = ExportOptions::from_config(config)?;
    let git = GitCli::new(&options.output_directory, options.deploy_key.clone());
    let vcs: Option<&dyn Vcs> = if is_git_installed() {
        Some(&git)
    } else {
        if options.commit {
            warn!("git is not installed. Nothing will be committed.");
        }
        None
    };

    let report = prefs_export(&options, &rules, &Plutil, vcs)
        .with_context(|| format!("export to {} failed", options.output_directory.display()))?;
    if !report.omitted.is_empty() {
        info!("{} keys could not be rendered.", report.omitted.len());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn run_install_job(config: &Config) -> Result<()> {
    let path = install_job(
        &config.settings.output_directory,
        config.settings.deploy_key.as_deref(),
    )
    .context("failed to install the launchd job")?;
    info!("Installed {}.", path.display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.common.debug);
    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }
}
