use log::debug;

use super::{Omission, Renderer, quote};
use crate::value::Dictionary;

/// Domain predicate: true means the domain is excluded.
pub type DomainFilter<'a> = &'a dyn Fn(&str) -> bool;
/// Key predicate over `(domain, key)`: true means the key is excluded.
pub type KeyFilter<'a> = &'a dyn Fn(&str, &str) -> bool;

/// Output of compiling one domain.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompiledDomain {
    /// `# <domain>`, the commands, then an empty separator line. Empty when
    /// nothing was emitted.
    pub lines: Vec<String>,
    /// Keys that passed the filters but could not be rendered.
    pub omitted: Vec<Omission>,
}

impl CompiledDomain {
    /// Number of commands, without the header and separator.
    pub fn command_count(&self) -> usize {
        self.lines.len().saturating_sub(2)
    }
}

/// Compile a preference root into `defaults write` commands.
///
/// With `invert` the filters are flipped, so the output lists exactly the
/// keys a normal run drops. Keys are visited in sorted order.
pub fn compile_domain(
    domain: &str,
    root: &Dictionary,
    renderer: &Renderer,
    domain_filter: Option<DomainFilter<'_>>,
    key_filter: Option<KeyFilter<'_>>,
    invert: bool,
) -> CompiledDomain {
    let mut compiled = CompiledDomain::default();
    if domain_filter.is_some_and(|excluded| excluded(domain) != invert) {
        return compiled;
    }
    let prefix = match quote(domain) {
        Ok(quoted) => format!("defaults write {quoted}"),
        Err(reason) => {
            debug!("Skipping domain {domain:?}: {}.", reason.as_str());
            return compiled;
        }
    };

    let mut lines = Vec::new();
    for (key, value) in root {
        if key_filter.is_some_and(|excluded| excluded(domain, key) != invert) {
            continue;
        }
        match renderer.render(key, value, &prefix) {
            Ok(line) => lines.push(line),
            Err(reason) => {
                debug!("Skipped {domain} {key} ({}): {}.", value.kind(), reason.as_str());
                compiled.omitted.push(Omission {
                    domain: domain.to_string(),
                    key: key.clone(),
                    reason,
                });
            }
        }
    }

    if !lines.is_empty() {
        compiled.lines.reserve(lines.len() + 2);
        compiled.lines.push(format!("# {domain}"));
        compiled.lines.extend(lines);
        compiled.lines.push(String::new());
    }
    compiled
}

/// Lines for one domain, rendered with the default length cap.
pub fn plist_to_defaults_commands(
    domain: &str,
    root: &Dictionary,
    domain_filter: Option<DomainFilter<'_>>,
    key_filter: Option<KeyFilter<'_>>,
    invert: bool,
) -> Vec<String> {
    compile_domain(
        domain,
        root,
        &Renderer::default(),
        domain_filter,
        key_filter,
        invert,
    )
    .lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::OmitReason;
    use crate::rules::RuleSet;
    use crate::value::Value;

    fn root() -> Dictionary {
        let mut root = Dictionary::new();
        root.insert("zeta".into(), Value::Integer(1));
        root.insert("alpha".into(), Value::Boolean(true));
        root.insert("mod-count".into(), Value::Integer(9));
        root.insert("nested".into(), Value::Array(vec![Value::Array(vec![])]));
        root
    }

    #[test]
    fn header_sorted_keys_and_separator() {
        let lines = plist_to_defaults_commands("com.example", &root(), None, None, false);
        assert_eq!(
            lines,
            vec![
                "# com.example",
                "defaults write com.example alpha -bool true",
                "defaults write com.example mod-count -int 9",
                "defaults write com.example zeta -int 1",
                "",
            ]
        );
    }

    #[test]
    fn empty_root_yields_nothing() {
        let lines = plist_to_defaults_commands("com.example", &Dictionary::new(), None, None, false);
        assert!(lines.is_empty());
    }

    #[test]
    fn only_unrenderable_keys_yields_nothing() {
        let mut root = Dictionary::new();
        root.insert("uid".into(), Value::Uid(1));
        let compiled = compile_domain("d", &root, &Renderer::default(), None, None, false);
        assert!(compiled.lines.is_empty());
        assert_eq!(compiled.omitted.len(), 1);
        assert_eq!(compiled.omitted[0].reason, OmitReason::Unsupported);
    }

    #[test]
    fn omissions_are_recorded() {
        let compiled = compile_domain("d", &root(), &Renderer::default(), None, None, false);
        assert_eq!(
            compiled.omitted,
            vec![Omission {
                domain: "d".into(),
                key: "nested".into(),
                reason: OmitReason::NotSimple,
            }]
        );
        assert_eq!(compiled.command_count(), 3);
    }

    #[test]
    fn key_filter_and_inversion_partition_keys() {
        let rules = RuleSet::builtin();
        let filter = |d: &str, k: &str| rules.key_excluded(d, k);
        let accepted =
            plist_to_defaults_commands("com.apple.dock", &root(), None, Some(&filter), false);
        let rejected =
            plist_to_defaults_commands("com.apple.dock", &root(), None, Some(&filter), true);
        assert!(!accepted.iter().any(|l| l.contains("mod-count")));
        assert_eq!(
            rejected,
            vec![
                "# com.apple.dock",
                "defaults write com.apple.dock mod-count -int 9",
                "",
            ]
        );
    }

    #[test]
    fn domain_filter_excludes_domain() {
        let rules = RuleSet::builtin();
        let filter = |d: &str| rules.domain_excluded(d);
        let lines = plist_to_defaults_commands("com.apple.Music", &root(), Some(&filter), None, false);
        assert!(lines.is_empty());
        let lines = plist_to_defaults_commands("com.example", &root(), Some(&filter), None, true);
        assert!(lines.is_empty());
    }

    #[test]
    fn global_domain_prefix_is_unquoted() {
        let mut root = Dictionary::new();
        root.insert("AppleShowAllExtensions".into(), Value::Boolean(true));
        let lines = plist_to_defaults_commands("-globalDomain", &root, None, None, false);
        assert_eq!(
            lines[1],
            "defaults write -globalDomain AppleShowAllExtensions -bool true"
        );
    }
}
