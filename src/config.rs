use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Embedded default configuration, including the built-in rule tables.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Default cap on emitted string and data lengths.
pub const DEFAULT_MAX_LENGTH: usize = 120;

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    /// Domains excluded by exact name.
    #[serde(default)]
    pub domains: IgnoreList,
    /// Domains excluded when their name starts with any entry.
    #[serde(default)]
    pub domain_prefixes: IgnoreList,
    /// Key patterns excluded in every domain.
    #[serde(default)]
    pub key_patterns: IgnoreList,
    /// Per-domain key rules.
    #[serde(default)]
    pub keys: KeyTable,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    /// SSH key used to push the output repository.
    #[serde(default)]
    pub deploy_key: Option<PathBuf>,
    #[serde(default)]
    pub commit: bool,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_directory: default_output_directory(),
            deploy_key: None,
            commit: false,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("~/.local/share/prefs-export")
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct IgnoreList {
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct KeyTable {
    /// Domain name → rules for keys in that domain.
    #[serde(default)]
    pub ignore: BTreeMap<String, Vec<KeyRuleSpec>>,
}

/// One per-domain key rule as written in TOML.
///
/// A bare string is a literal key name; `{ regex = "..." }` is a pattern
/// matched at the start of the key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum KeyRuleSpec {
    Literal(String),
    Regex { regex: String },
}

impl KeyRuleSpec {
    pub fn literal(key: impl Into<String>) -> Self {
        KeyRuleSpec::Literal(key.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        KeyRuleSpec::Regex {
            regex: pattern.into(),
        }
    }
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    domains: ListOverlay,
    #[serde(default)]
    domain_prefixes: ListOverlay,
    #[serde(default)]
    key_patterns: ListOverlay,
    #[serde(default)]
    keys: KeysOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsOverlay {
    output_directory: Option<PathBuf>,
    deploy_key: Option<PathBuf>,
    commit: Option<bool>,
    max_length: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ListOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    ignore: Vec<String>,
    #[serde(default)]
    remove_ignore: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct KeysOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    ignore: BTreeMap<String, Vec<KeyRuleSpec>>,
    /// Drop every default rule for these domains.
    #[serde(default)]
    remove_domains: Vec<String>,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list<T: PartialEq>(base: &mut Vec<T>, add: Vec<T>, remove: &[T], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

/// Merge per-domain key rules. Merging a domain that already has rules
/// unions the two rule lists.
fn merge_keys(
    base: &mut BTreeMap<String, Vec<KeyRuleSpec>>,
    add: BTreeMap<String, Vec<KeyRuleSpec>>,
    remove_domains: &[String],
    replace: bool,
) {
    if replace {
        *base = add;
        return;
    }
    base.retain(|domain, _| !remove_domains.contains(domain));
    for (domain, rules) in add {
        merge_list(base.entry(domain).or_default(), rules, &[], false);
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge the user overlay from `path`, or from
    ///    ~/.config/macprefs/config.toml when no path is given
    /// 3. Expand `~` and `$VAR` in path settings
    ///
    /// A missing overlay file is not an error. An unreadable or malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default_config();
        if let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) {
            if let Some(overlay) = Self::load_overlay(&path)? {
                config.apply_overlay(overlay);
            }
        }
        config.expand_paths()?;
        Ok(config)
    }

    fn load_overlay(path: &Path) -> Result<Option<ConfigOverlay>, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("No configuration file at {}. Using defaults.", path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        debug!("Parsing configuration file {}.", path.display());
        toml::from_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        // Settings: scalar overrides
        let s = overlay.settings;
        if let Some(v) = s.output_directory {
            self.settings.output_directory = v;
        }
        if let Some(v) = s.deploy_key {
            self.settings.deploy_key = Some(v);
        }
        if let Some(v) = s.commit {
            self.settings.commit = v;
        }
        if let Some(v) = s.max_length {
            self.settings.max_length = v;
        }

        let d = overlay.domains;
        merge_list(&mut self.domains.ignore, d.ignore, &d.remove_ignore, d.replace);

        let p = overlay.domain_prefixes;
        merge_list(
            &mut self.domain_prefixes.ignore,
            p.ignore,
            &p.remove_ignore,
            p.replace,
        );

        let kp = overlay.key_patterns;
        merge_list(
            &mut self.key_patterns.ignore,
            kp.ignore,
            &kp.remove_ignore,
            kp.replace,
        );

        let k = overlay.keys;
        merge_keys(&mut self.keys.ignore, k.ignore, &k.remove_domains, k.replace);
    }

    /// Extend (or with `replace`, substitute) the global key patterns.
    pub fn extend_key_patterns(
        &mut self,
        patterns: impl IntoIterator<Item = impl Into<String>>,
        replace: bool,
    ) {
        let patterns = patterns.into_iter().map(Into::into).collect();
        merge_list(&mut self.key_patterns.ignore, patterns, &[], replace);
    }

    /// Extend (or with `replace`, substitute) the per-domain key rules.
    pub fn extend_keys(&mut self, keys: BTreeMap<String, Vec<KeyRuleSpec>>, replace: bool) {
        merge_keys(&mut self.keys.ignore, keys, &[], replace);
    }

    /// Expand `~` and environment variables in path settings. A deploy key
    /// that does not exist is dropped with a warning.
    fn expand_paths(&mut self) -> Result<(), ConfigError> {
        self.settings.output_directory = expand_path(&self.settings.output_directory)?;
        if let Some(key) = self.settings.deploy_key.take() {
            let key = expand_path(&key)?;
            if key.exists() {
                self.settings.deploy_key = Some(key);
            } else {
                warn!("Deploy key `{}` does not exist.", key.display());
            }
        }
        Ok(())
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}

/// ~/.config/macprefs/config.toml, when HOME is known.
pub fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(Path::new(&home).join(".config/macprefs/config.toml"))
}

fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let raw = path.to_string_lossy();
    Ok(PathBuf::from(shellexpand::full(&raw)?.into_owned()))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Overlay file exists but cannot be read.
    #[error("failed to read configuration file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Overlay file is not valid TOML or has the wrong shape.
    #[error("failed to parse configuration file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A key pattern does not compile.
    #[error("invalid key pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    /// Shell expansion of a path setting fails.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}
