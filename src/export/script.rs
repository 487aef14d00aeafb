use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const SHELLCHECK_DIRECTIVE: &str = "# shellcheck disable=SC1003,SC1010,SC1112,SC2016,SC2088";
const GENERATED_NOTICE: &str = "# This file is generated, but is versioned.";

/// The two scripts written to the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Executable replay of every accepted key.
    Accepted,
    /// Keys dropped by the filters, kept for reference.
    Rejected,
}

impl Script {
    pub fn file_name(self) -> &'static str {
        match self {
            Script::Accepted => "exec-defaults.sh",
            Script::Rejected => "rejected-defaults.sh",
        }
    }

    fn first_line(self) -> &'static str {
        match self {
            Script::Accepted => "#!/usr/bin/env bash",
            Script::Rejected => "# Rejected defaults values.",
        }
    }

    /// Header text, ending with a blank line.
    pub fn header(self) -> String {
        format!(
            "{}\n{SHELLCHECK_DIRECTIVE}\n{GENERATED_NOTICE}\n\n",
            self.first_line()
        )
    }
}

/// Streams compiled lines into one script file.
pub struct ScriptWriter {
    script: Script,
    path: PathBuf,
    out: BufWriter<File>,
}

impl ScriptWriter {
    /// Create (or truncate) the script in `dir` and write its header.
    pub fn create(dir: &Path, script: Script) -> io::Result<Self> {
        let path = dir.join(script.file_name());
        let mut out = BufWriter::new(File::create(&path)?);
        out.write_all(script.header().as_bytes())?;
        Ok(Self { script, path, out })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_lines(&mut self, lines: &[String]) -> io::Result<()> {
        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    /// Flush the file. The accepted script is made executable.
    pub fn finish(mut self) -> io::Result<PathBuf> {
        self.out.flush()?;
        if self.script == Script::Accepted {
            make_executable(&self.path)?;
        }
        Ok(self.path)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
