use std::io;
use std::path::Path;
use std::process::Command;

use log::debug;

/// Rewrites an exported property list in place as XML.
pub trait PlistConverter: Send + Sync {
    fn convert_to_xml(&self, path: &Path) -> io::Result<()>;
}

/// Converter backed by `plutil -convert xml1`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Plutil;

impl PlistConverter for Plutil {
    fn convert_to_xml(&self, path: &Path) -> io::Result<()> {
        debug!("Executing: plutil -convert xml1 {}", path.display());
        let output = Command::new("plutil")
            .args(["-convert", "xml1"])
            .arg(path)
            .output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "plutil exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}
