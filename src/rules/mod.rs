//! Exclusion rules for domains and keys.
//!
//! A [`RuleSet`] is built once from a [`Config`] and never changes afterwards.
//! All key patterns match at the start of the key only; a pattern that wants
//! a full match anchors its own end with `$`.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use regex::Regex;

use crate::config::{Config, ConfigError, KeyRuleSpec};

/// A compiled per-domain key rule.
#[derive(Debug, Clone)]
pub enum KeyRule {
    Literal(String),
    Regex(Regex),
}

impl KeyRule {
    fn compile(spec: &KeyRuleSpec) -> Result<Self, ConfigError> {
        Ok(match spec {
            KeyRuleSpec::Literal(key) => KeyRule::Literal(key.clone()),
            KeyRuleSpec::Regex { regex } => KeyRule::Regex(anchored(regex)?),
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyRule::Literal(literal) => literal == key,
            KeyRule::Regex(re) => re.is_match(key),
        }
    }
}

/// Immutable exclusion rules for one run.
#[derive(Debug, Clone)]
pub struct RuleSet {
    domains: HashSet<String>,
    prefixes: Vec<String>,
    keys: HashMap<String, Vec<KeyRule>>,
    global: Option<Regex>,
}

impl RuleSet {
    /// Rules from the embedded tables alone.
    pub fn builtin() -> Self {
        Self::from_config(&Config::default_config()).expect("embedded key patterns must compile")
    }

    /// Compile the rule sections of `config`. Every pattern is checked here.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut keys = HashMap::with_capacity(config.keys.ignore.len());
        for (domain, specs) in &config.keys.ignore {
            let rules = specs
                .iter()
                .map(KeyRule::compile)
                .collect::<Result<Vec<_>, _>>()?;
            keys.insert(domain.clone(), rules);
        }

        Ok(Self {
            domains: config.domains.ignore.iter().cloned().collect(),
            prefixes: config.domain_prefixes.ignore.clone(),
            keys,
            global: global_pattern(&config.key_patterns.ignore)?,
        })
    }

    /// True if the domain is ignored by name or by prefix.
    pub fn domain_excluded(&self, domain: &str) -> bool {
        self.domains.contains(domain) || self.excluded_prefix(domain).is_some()
    }

    pub fn is_ignored_domain(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    /// First ignored prefix the domain starts with.
    pub fn excluded_prefix(&self, domain: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .map(String::as_str)
            .find(|prefix| domain.starts_with(prefix))
    }

    /// True if `key` in `domain` should not be exported.
    pub fn key_excluded(&self, domain: &str, key: &str) -> bool {
        if self.global.as_ref().is_some_and(|re| re.is_match(key)) {
            debug!("Skipping {domain}[{key}] because it matched the ignored keys pattern.");
            return true;
        }
        let Some(rules) = self.keys.get(domain) else {
            return false;
        };
        let literal_hit = rules
            .iter()
            .any(|rule| matches!(rule, KeyRule::Literal(_)) && rule.matches(key));
        if literal_hit {
            debug!("Skipping {domain}[{key}] because it is an ignored key.");
            return true;
        }
        let pattern_hit = rules
            .iter()
            .any(|rule| matches!(rule, KeyRule::Regex(_)) && rule.matches(key));
        if pattern_hit {
            debug!("Skipping {domain}[{key}] because it matched an ignored key pattern.");
        }
        pattern_hit
    }
}

/// Compile `pattern` so it only matches at the start of the input.
fn anchored(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_string(),
        source: Box::new(source),
    })
}

/// Join the global patterns into one alternation. Each pattern is compiled
/// on its own first so a failure names the pattern at fault.
fn global_pattern(patterns: &[String]) -> Result<Option<Regex>, ConfigError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    for pattern in patterns {
        anchored(pattern)?;
    }
    let joined = patterns
        .iter()
        .map(|p| format!("(?:{p})"))
        .collect::<Vec<_>>()
        .join("|");
    debug!("Ignored keys pattern: {joined}");
    anchored(&joined).map(Some)
}

/// Build a key filter from the built-in tables plus caller additions.
///
/// With `reset_patterns` the extra patterns replace the built-in global
/// patterns instead of extending them. `reset_keys` does the same for the
/// per-domain key table.
pub fn make_key_filter<I, S>(
    extra_patterns: I,
    extra_keys: BTreeMap<String, Vec<KeyRuleSpec>>,
    reset_patterns: bool,
    reset_keys: bool,
) -> Result<impl Fn(&str, &str) -> bool + Send + Sync, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut config = Config::default_config();
    config.extend_key_patterns(extra_patterns, reset_patterns);
    config.extend_keys(extra_keys, reset_keys);
    let rules = RuleSet::from_config(&config)?;
    Ok(move |domain: &str, key: &str| rules.key_excluded(domain, key))
}
