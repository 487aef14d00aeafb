//! Scheduled export through a per-user launchd agent.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};
use serde::Serialize;

use crate::logging;

pub const JOB_LABEL: &str = "sh.tat.macprefs";

/// launchd agent descriptor, serialized as an XML property list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchAgent {
    pub label: String,
    pub program_arguments: Vec<String>,
    pub run_at_load: bool,
    pub standard_error_path: String,
    pub standard_out_path: String,
    pub start_calendar_interval: CalendarInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CalendarInterval {
    pub hour: u8,
    pub minute: u8,
}

impl LaunchAgent {
    /// Daily run at midnight of `program --output-directory <dir> --commit`.
    pub fn new(
        program: &Path,
        output_directory: &Path,
        deploy_key: Option<&Path>,
        log_path: &Path,
    ) -> Self {
        let mut program_arguments = vec![
            program.display().to_string(),
            "--output-directory".to_string(),
            output_directory.display().to_string(),
            "--commit".to_string(),
        ];
        if let Some(key) = deploy_key {
            program_arguments.push("--deploy-key".to_string());
            program_arguments.push(key.display().to_string());
        }
        let log_path = log_path.display().to_string();
        Self {
            label: JOB_LABEL.to_string(),
            program_arguments,
            run_at_load: true,
            standard_error_path: log_path.clone(),
            standard_out_path: log_path,
            start_calendar_interval: CalendarInterval { hour: 0, minute: 0 },
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), JobError> {
        plist::to_file_xml(path, self).map_err(|source| JobError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// ~/Library/LaunchAgents/sh.tat.macprefs.plist
pub fn agent_path() -> Result<PathBuf, JobError> {
    let home = std::env::var_os("HOME").ok_or(JobError::NoHome)?;
    Ok(PathBuf::from(home)
        .join("Library/LaunchAgents")
        .join(format!("{JOB_LABEL}.plist")))
}

/// Write the agent descriptor and (re)load it with launchctl.
///
/// Returns the descriptor path.
pub fn install_job(output_directory: &Path, deploy_key: Option<&Path>) -> Result<PathBuf, JobError> {
    let program = std::env::current_exe().map_err(JobError::CurrentExe)?;
    std::fs::create_dir_all(output_directory).map_err(io_error(output_directory))?;
    let output_directory = output_directory
        .canonicalize()
        .map_err(io_error(output_directory))?;
    let deploy_key = deploy_key
        .map(|key| key.canonicalize().map_err(io_error(key)))
        .transpose()?;
    let log_path = logging::log_path().ok_or(JobError::NoHome)?;
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
    }

    let agent = LaunchAgent::new(&program, &output_directory, deploy_key.as_deref(), &log_path);
    let path = agent_path()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
    }
    agent.write(&path)?;
    info!("Wrote {}.", path.display());

    // Not loaded yet on a first install, so these may fail.
    let _ = launchctl(&["stop"], &path, true);
    let _ = launchctl(&["unload", "-w"], &path, true);
    let loaded = launchctl(&["load", "-w"], &path, false);
    let started = launchctl(&["start"], &path, false);
    loaded.and(started)?;
    Ok(path)
}

fn launchctl(args: &[&'static str], plist: &Path, quiet: bool) -> Result<(), JobError> {
    debug!("Running: launchctl {} {}", args.join(" "), plist.display());
    let mut command = Command::new("launchctl");
    command.args(args).arg(plist);
    if quiet {
        command.stdout(Stdio::null()).stderr(Stdio::null());
    }
    let status = command.status().map_err(|source| JobError::Io {
        path: PathBuf::from("launchctl"),
        source,
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(JobError::Launchctl {
            action: args.join(" "),
            status,
        })
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> JobError + '_ {
    move |source| JobError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("cannot determine the home directory")]
    NoHome,

    #[error("cannot locate the running executable")]
    CurrentExe(#[source] io::Error),

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write job descriptor {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },

    #[error("`launchctl {action}` failed ({status})")]
    Launchctl {
        action: String,
        status: std::process::ExitStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(deploy_key: Option<&Path>) -> LaunchAgent {
        LaunchAgent::new(
            Path::new("/usr/local/bin/prefs-export"),
            Path::new("/Users/me/prefs"),
            deploy_key,
            Path::new("/Users/me/Library/Logs/macprefs/macprefs.log"),
        )
    }

    #[test]
    fn arguments_without_key() {
        assert_eq!(
            agent(None).program_arguments,
            vec![
                "/usr/local/bin/prefs-export",
                "--output-directory",
                "/Users/me/prefs",
                "--commit",
            ]
        );
    }

    #[test]
    fn arguments_with_key() {
        let args = agent(Some(Path::new("/Users/me/.ssh/deploy"))).program_arguments;
        assert_eq!(&args[4..], ["--deploy-key", "/Users/me/.ssh/deploy"]);
    }

    #[test]
    fn descriptor_round_trips_through_plist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.plist");
        agent(None).write(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("<key>StartCalendarInterval</key>"));
        assert!(text.contains("<key>RunAtLoad</key>"));

        let value = plist::Value::from_file(&path).unwrap();
        let dict = value.as_dictionary().unwrap();
        assert_eq!(
            dict.get("Label").and_then(plist::Value::as_string),
            Some(JOB_LABEL)
        );
        assert_eq!(
            dict.get("StandardOutPath").and_then(plist::Value::as_string),
            Some("/Users/me/Library/Logs/macprefs/macprefs.log")
        );
        let interval = dict
            .get("StartCalendarInterval")
            .and_then(plist::Value::as_dictionary)
            .unwrap();
        assert_eq!(
            interval.get("Hour").and_then(plist::Value::as_unsigned_integer),
            Some(0)
        );
    }
}
