//! Export of live preference domains to an output directory.
//!
//! One run discovers the domains under `~/Library/Preferences`, copies and
//! parses them in parallel, writes `exec-defaults.sh` and
//! `rejected-defaults.sh`, converts the copies to XML, removes stale copies,
//! and optionally commits and pushes the result.

/// Versioning of the output directory.
pub mod git;
/// launchd agent installation.
pub mod job;
/// XML conversion of exported property lists.
pub mod plutil;
/// Script headers and writers.
pub mod script;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info};
use serde::Serialize;

use crate::config::Config;
use crate::render::compile::compile_domain;
use crate::render::{Omission, Renderer};
use crate::rules::RuleSet;
use crate::value::sanitize::remove_data_fields;
use crate::value::{self, Dictionary};

use self::git::{GitError, Vcs};
use self::job::JobError;
use self::plutil::PlistConverter;
use self::script::{Script, ScriptWriter};

/// Argument `defaults` uses for the global domain.
pub const GLOBAL_DOMAIN: &str = "-globalDomain";
/// Domains copied and parsed at the same time.
pub const MAX_CONCURRENT_EXPORT_TASKS: usize = 40;
/// Subdirectory of the output directory holding the plist copies.
pub const PREFERENCES_DIR: &str = "Preferences";

/// File stem used for `domain` in the output directory.
pub fn output_stem(domain: &str) -> &str {
    if domain == GLOBAL_DOMAIN {
        "globalDomain"
    } else {
        domain
    }
}

/// File stem of `domain` in `~/Library/Preferences`.
pub fn source_stem(domain: &str) -> &str {
    if domain == GLOBAL_DOMAIN {
        ".GlobalPreferences"
    } else {
        domain
    }
}

/// Where to read from and write to, and what to do afterwards.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_directory: PathBuf,
    pub source_directory: PathBuf,
    pub deploy_key: Option<PathBuf>,
    pub commit: bool,
    pub max_length: usize,
}

impl ExportOptions {
    /// Options from settings, reading from `~/Library/Preferences`.
    pub fn from_config(config: &Config) -> Result<Self, ExportError> {
        let home = std::env::var_os("HOME").ok_or(ExportError::NoHome)?;
        Ok(Self {
            output_directory: config.settings.output_directory.clone(),
            source_directory: PathBuf::from(home).join("Library/Preferences"),
            deploy_key: config.settings.deploy_key.clone(),
            commit: config.settings.commit,
            max_length: config.settings.max_length,
        })
    }

    pub fn preferences_directory(&self) -> PathBuf {
        self.output_directory.join(PREFERENCES_DIR)
    }
}

/// Summary of one run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExportReport {
    pub output_directory: PathBuf,
    /// Domains with at least one key, in script order.
    pub domains: Vec<String>,
    /// Commands written to `exec-defaults.sh`.
    pub accepted: usize,
    /// Commands written to `rejected-defaults.sh`.
    pub rejected: usize,
    pub omitted: Vec<Omission>,
    pub removed: Vec<PathBuf>,
    pub committed: bool,
}

/// Domains to export: every `*.plist` in `source_dir` that is not a dotfile
/// or excluded by `rules`, sorted, followed by the global domain.
pub fn generate_domains(source_dir: &Path, rules: &RuleSet) -> Result<Vec<String>, ExportError> {
    let mut domains = Vec::new();
    for entry in fs::read_dir(source_dir).map_err(io_error(source_dir))? {
        let path = entry.map_err(io_error(source_dir))?.path();
        if path.extension().is_none_or(|ext| ext != "plist") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.starts_with('.') {
            debug!("Skipping `{stem}` because it begins with a `.`.");
            continue;
        }
        if rules.is_ignored_domain(stem) {
            debug!("Skipping `{stem}` because it is in the ignored domains list.");
            continue;
        }
        if let Some(prefix) = rules.excluded_prefix(stem) {
            debug!("Skipping `{stem}` because it begins with `{prefix}`.");
            continue;
        }
        domains.push(stem.to_string());
    }
    domains.sort();
    domains.push(GLOBAL_DOMAIN.to_string());
    Ok(domains)
}

/// Copy one domain into `prefs_dir` and parse the copy.
///
/// An unreadable or vanished source, or a copy that does not parse, gives an
/// empty root.
pub fn defaults_export(
    domain: &str,
    source_dir: &Path,
    prefs_dir: &Path,
) -> Result<(String, Dictionary), ExportError> {
    let source = source_dir.join(format!("{}.plist", source_stem(domain)));
    let target = prefs_dir.join(format!("{}.plist", output_stem(domain)));
    match fs::copy(&source, &target) {
        Ok(_) => debug!("Copied {} to {}.", source.display(), target.display()),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound
            ) =>
        {
            debug!("Cannot copy {}: {err}", source.display());
            return Ok((domain.to_string(), Dictionary::new()));
        }
        Err(err) => return Err(io_error(&source)(err)),
    }
    let bytes = fs::read(&target).map_err(io_error(&target))?;
    let root = match value::parse_root(&bytes) {
        Ok(root) => remove_data_fields(&root),
        Err(err) => {
            debug!("{}: Invalid property list file: {err}", target.display());
            Dictionary::new()
        }
    };
    Ok((domain.to_string(), root))
}

/// Run `task` over `items` on scoped threads, at most
/// [`MAX_CONCURRENT_EXPORT_TASKS`] at a time. Results keep input order.
fn run_chunked<T, R, F>(items: &[T], task: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let task = &task;
    let mut results = Vec::with_capacity(items.len());
    for chunk in items.chunks(MAX_CONCURRENT_EXPORT_TASKS) {
        std::thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|item| scope.spawn(move || task(item)))
                .collect();
            for handle in handles {
                match handle.join() {
                    Ok(result) => results.push(result),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
        });
    }
    results
}

/// Export every domain to `options.output_directory`.
///
/// `vcs` is `None` when git is not available; stale copies are then removed
/// from disk only and nothing is committed.
pub fn prefs_export(
    options: &ExportOptions,
    rules: &RuleSet,
    converter: &dyn PlistConverter,
    vcs: Option<&dyn Vcs>,
) -> Result<ExportReport, ExportError> {
    let out_dir = &options.output_directory;
    let prefs_dir = options.preferences_directory();
    fs::create_dir_all(&prefs_dir).map_err(io_error(&prefs_dir))?;

    let domains = generate_domains(&options.source_directory, rules)?;
    info!("Exporting {} domains to {}.", domains.len(), out_dir.display());
    let mut all_data = run_chunked(&domains, |domain| {
        defaults_export(domain, &options.source_directory, &prefs_dir)
    })
    .into_iter()
    .collect::<Result<Vec<_>, _>>()?;
    all_data.sort_by(|a, b| a.0.cmp(&b.0));
    all_data.retain(|(_, root)| !root.is_empty());

    let renderer = Renderer::new(options.max_length);
    let key_filter = |domain: &str, key: &str| rules.key_excluded(domain, key);
    let mut report = ExportReport {
        output_directory: out_dir.clone(),
        ..ExportReport::default()
    };

    let mut accepted = ScriptWriter::create(out_dir, Script::Accepted)
        .map_err(io_error(&out_dir.join(Script::Accepted.file_name())))?;
    for (domain, root) in &all_data {
        let compiled = compile_domain(domain, root, &renderer, None, Some(&key_filter), false);
        accepted
            .write_lines(&compiled.lines)
            .map_err(io_error(accepted.path()))?;
        report.accepted += compiled.command_count();
        report.omitted.extend(compiled.omitted);
        report.domains.push(domain.clone());
    }
    let accepted_path = accepted.path().to_path_buf();
    accepted.finish().map_err(io_error(&accepted_path))?;

    let mut rejected = ScriptWriter::create(out_dir, Script::Rejected)
        .map_err(io_error(&out_dir.join(Script::Rejected.file_name())))?;
    for (domain, root) in &all_data {
        let compiled = compile_domain(domain, root, &renderer, None, Some(&key_filter), true);
        rejected
            .write_lines(&compiled.lines)
            .map_err(io_error(rejected.path()))?;
        report.rejected += compiled.command_count();
    }
    let rejected_path = rejected.path().to_path_buf();
    rejected.finish().map_err(io_error(&rejected_path))?;

    let known: HashSet<&str> = all_data.iter().map(|(d, _)| output_stem(d)).collect();
    convert_all(converter, &prefs_dir, &known)?;

    if let Some(vcs) = vcs {
        vcs.ensure_repository()?;
    }
    report.removed = remove_stale(&prefs_dir, &known, vcs)?;

    if options.commit
        && let Some(vcs) = vcs
    {
        report.committed = commit_changes(vcs, options.deploy_key.is_some());
    }
    info!(
        "Wrote {} commands for {} domains ({} rejected).",
        report.accepted,
        report.domains.len(),
        report.rejected
    );
    Ok(report)
}

/// Convert every kept copy to XML. Failures are collected and reported
/// together.
fn convert_all(
    converter: &dyn PlistConverter,
    prefs_dir: &Path,
    known: &HashSet<&str>,
) -> Result<(), ExportError> {
    let mut stems: Vec<&str> = known.iter().copied().collect();
    stems.sort_unstable();
    let failed: Vec<String> = run_chunked(&stems, |stem| {
        let path = prefs_dir.join(format!("{stem}.plist"));
        converter.convert_to_xml(&path).map_err(|err| {
            debug!("Conversion of {} failed: {err}", path.display());
            (*stem).to_string()
        })
    })
    .into_iter()
    .filter_map(Result::err)
    .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(ExportError::Conversion(failed))
    }
}

/// Delete files in `prefs_dir` that belong to no kept domain.
fn remove_stale(
    prefs_dir: &Path,
    known: &HashSet<&str>,
    vcs: Option<&dyn Vcs>,
) -> Result<Vec<PathBuf>, ExportError> {
    let mut stale = Vec::new();
    for entry in fs::read_dir(prefs_dir).map_err(io_error(prefs_dir))? {
        let entry = entry.map_err(io_error(prefs_dir))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == ".gitignore" || entry.path().is_dir() {
            continue;
        }
        let is_known = name
            .strip_suffix(".plist")
            .is_some_and(|stem| known.contains(stem));
        if !is_known {
            stale.push(entry.path());
        }
    }
    if stale.is_empty() {
        return Ok(stale);
    }
    stale.sort();
    if let Some(vcs) = vcs {
        vcs.remove(&stale)?;
    }
    for path in &stale {
        debug!("Removing {}.", path.display());
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_error(path)(err)),
        }
    }
    Ok(stale)
}

/// Stage, commit and optionally push. A failure here usually means there
/// was nothing to commit, so it is logged rather than returned.
fn commit_changes(vcs: &dyn Vcs, push: bool) -> bool {
    debug!("Committing changes.");
    let result = (|| -> Result<(), GitError> {
        vcs.stage_all()?;
        let message = format!("Automatic commit @ {}", Utc::now().format("%c"));
        vcs.commit(&message)?;
        if push {
            let branch = vcs.current_branch()?;
            vcs.push(&branch)?;
        }
        Ok(())
    })();
    match result {
        Ok(()) => true,
        Err(err) => {
            debug!("{err}");
            info!("Likely no changes to commit.");
            false
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("cannot determine the home directory")]
    NoHome,

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// One or more copies could not be converted to XML. Both scripts have
    /// been written when this is returned.
    #[error("failed to convert property lists to XML: {}", .0.join(", "))]
    Conversion(Vec<String>),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Job(#[from] JobError),
}
