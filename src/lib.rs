//! macprefs: export macOS preference domains and compile them into
//! replayable `defaults write` scripts.
//!
//! Each live preference domain is copied, parsed into a [`value::Value`]
//! tree, stripped of binary data, and filtered through a [`rules::RuleSet`]
//! that separates deliberate settings from caches, timestamps and device
//! identifiers. What survives is rendered by [`render`] into shell-safe
//! commands with the right type flag.
//!
//! # Architecture
//!
//! - **[`value`]**: Preference value model, simplicity checks, data-field sanitizer.
//! - **[`rules`]**: Domain and key exclusion rules compiled from configuration.
//! - **[`render`]**: Per-value command rendering and per-domain compilation.
//! - **[`export`]**: Discovery, copying, script writing, stale cleanup, git and launchd seams.
//! - **[`config`]**: Configuration loading: embedded defaults + user overlay merge.
//! - **[`logging`]**: Terminal logger setup and the scheduled job's log path.

/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Export orchestration and its external collaborators.
pub mod export;
/// `log` facade setup.
pub mod logging;
/// `defaults write` rendering and domain compilation.
pub mod render;
/// Exclusion rule engine.
pub mod rules;
/// Preference value model.
pub mod value;

use value::Dictionary;

/// Compile one domain against the built-in rules.
///
/// This is the main entry point for tests and simple usage. Excluded
/// domains yield nothing; excluded keys are left out.
pub fn compile(domain: &str, root: &Dictionary) -> Vec<String> {
    let rules = rules::RuleSet::builtin();
    let domain_filter = |d: &str| rules.domain_excluded(d);
    let key_filter = |d: &str, k: &str| rules.key_excluded(d, k);
    render::compile::plist_to_defaults_commands(
        domain,
        root,
        Some(&domain_filter),
        Some(&key_filter),
        false,
    )
}
