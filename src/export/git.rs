use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use log::debug;

/// Author recorded on automatic commits.
pub const COMMIT_AUTHOR: &str = "macprefs <macprefs@tat.sh>";

/// Version control operations the exporter needs on its output directory.
pub trait Vcs: Send + Sync {
    /// Create the repository if it does not exist yet.
    fn ensure_repository(&self) -> Result<(), GitError>;
    /// Remove paths from the index and the work tree. Unknown paths are fine.
    fn remove(&self, paths: &[PathBuf]) -> Result<(), GitError>;
    fn stage_all(&self) -> Result<(), GitError>;
    fn commit(&self, message: &str) -> Result<(), GitError>;
    fn current_branch(&self) -> Result<String, GitError>;
    fn push(&self, branch: &str) -> Result<(), GitError>;
}

/// `git` subprocess bound to one work tree.
#[derive(Debug, Clone)]
pub struct GitCli {
    work_tree: PathBuf,
    git_dir: PathBuf,
    ssh_key: Option<PathBuf>,
}

impl GitCli {
    pub fn new(work_tree: impl Into<PathBuf>, ssh_key: Option<PathBuf>) -> Self {
        let work_tree = work_tree.into();
        let git_dir = work_tree.join(".git");
        Self {
            work_tree,
            git_dir,
            ssh_key,
        }
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    /// Arguments placed before every subcommand.
    fn base_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(key) = &self.ssh_key {
            args.push("-c".into());
            args.push(format!("core.sshCommand={}", ssh_command(key)).into());
        }
        let mut git_dir = OsString::from("--git-dir=");
        git_dir.push(&self.git_dir);
        let mut work_tree = OsString::from("--work-tree=");
        work_tree.push(&self.work_tree);
        args.push(git_dir);
        args.push(work_tree);
        args
    }

    /// Run a subcommand and return its trimmed stdout.
    fn run<I, S>(&self, args: I) -> Result<String, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let command = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        debug!("Running: git {command}");
        let output = Command::new("git")
            .args(self.base_args())
            .args(&args)
            .output()
            .map_err(GitError::Spawn)?;
        if !output.status.success() {
            return Err(GitError::Failed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Vcs for GitCli {
    fn ensure_repository(&self) -> Result<(), GitError> {
        if self.git_dir.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.work_tree).map_err(GitError::Spawn)?;
        debug!("Running: git init {}", self.work_tree.display());
        let output = Command::new("git")
            .arg("init")
            .arg(&self.work_tree)
            .output()
            .map_err(GitError::Spawn)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GitError::Failed {
                command: "init".into(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn remove(&self, paths: &[PathBuf]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args: Vec<OsString> = ["rm", "-f", "--ignore-unmatch", "--"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.extend(paths.iter().map(|p| p.as_os_str().to_owned()));
        self.run(args).map(drop)
    }

    fn stage_all(&self) -> Result<(), GitError> {
        self.run(["add", "."]).map(drop)
    }

    fn commit(&self, message: &str) -> Result<(), GitError> {
        let author = format!("--author={COMMIT_AUTHOR}");
        self.run([
            "commit",
            "--no-gpg-sign",
            "--quiet",
            "--no-verify",
            author.as_str(),
            "-m",
            message,
        ])
        .map(drop)
    }

    fn current_branch(&self) -> Result<String, GitError> {
        self.run(["branch", "--show-current"])
    }

    fn push(&self, branch: &str) -> Result<(), GitError> {
        self.run(["push", "-u", "--porcelain", "--no-signed", "origin", branch])
            .map(drop)
    }
}

/// SSH invocation that uses only `key` and skips host key prompts.
fn ssh_command(key: &Path) -> String {
    let key = key.to_string_lossy();
    let quoted = shlex::try_quote(&key).unwrap_or(key.clone());
    format!(
        "ssh -i {quoted} -F /dev/null -o UserKnownHostsFile=/dev/null -o StrictHostKeyChecking=no"
    )
}

/// True if a working `git` is on the PATH.
pub fn is_git_installed() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("failed to run git")]
    Spawn(#[source] io::Error),

    #[error("`git {command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lossy(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn base_args_point_at_work_tree() {
        let git = GitCli::new("/tmp/out", None);
        assert_eq!(
            lossy(&git.base_args()),
            vec!["--git-dir=/tmp/out/.git", "--work-tree=/tmp/out"]
        );
    }

    #[test]
    fn deploy_key_sets_ssh_command() {
        let git = GitCli::new("/tmp/out", Some(PathBuf::from("/keys/deploy key")));
        let args = lossy(&git.base_args());
        assert_eq!(args[0], "-c");
        assert_eq!(
            args[1],
            "core.sshCommand=ssh -i '/keys/deploy key' -F /dev/null \
             -o UserKnownHostsFile=/dev/null -o StrictHostKeyChecking=no"
        );
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn failed_error_names_command() {
        let err = GitError::Failed {
            command: "commit -m x".into(),
            status: ExitStatus::default(),
            stderr: "nothing to commit".into(),
        };
        let message = err.to_string();
        assert!(message.starts_with("`git commit -m x` failed"));
        assert!(message.ends_with("nothing to commit"));
    }
}
