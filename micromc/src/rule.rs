//! Evaluation of the OS/arch/feature rule lists found in version metadata, used to
//! gate libraries and arguments per host and per enabled feature.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::env;

use crate::version::serde::{Rule, RuleAction, RuleOs};


/// Facts about the host the rules are evaluated against. The regular evaluation uses
/// [`Host::current`], custom facts are mostly useful for testing.
#[derive(Debug, Clone)]
pub struct Host {
    /// Mojang OS name, `linux`, `windows` or `osx`, none if the OS is unknown to the
    /// metadata format and therefore never matched by any rule.
    pub name: Option<&'static str>,
    /// Mojang arch name, `x86`, `x86_64`, `arm32` or `arm64`.
    pub arch: Option<&'static str>,
    /// Pointer-width string, `32` or `64`, substituted for `${arch}` in natives
    /// classifiers.
    pub bits: Option<&'static str>,
    /// The OS version, matched by the rules' version regex.
    pub version: Option<String>,
}

impl Host {

    /// Return the facts of the host this binary has been compiled for.
    pub fn current() -> &'static Host {

        static CURRENT: LazyLock<Host> = LazyLock::new(|| {

            use os_info::Version;

            let version = match os_info::get().version() {
                Version::Unknown => None,
                version => Some(version.to_string()),
            };

            Host {
                name: match env::consts::OS {
                    "windows" => Some("windows"),
                    "linux" => Some("linux"),
                    "macos" => Some("osx"),
                    _ => None,
                },
                arch: match env::consts::ARCH {
                    "x86" => Some("x86"),
                    "x86_64" => Some("x86_64"),
                    "arm" => Some("arm32"),
                    "aarch64" => Some("arm64"),
                    _ => None,
                },
                bits: match env::consts::ARCH {
                    "x86" | "arm" => Some("32"),
                    "x86_64" | "aarch64" => Some("64"),
                    _ => None,
                },
                version,
            }

        });

        &CURRENT

    }

}

/// Evaluate a rule list against the given host facts and enabled features, returning
/// true if the outcome is ALLOW.
///
/// An empty list is implicitly allowed. A non-empty list starts disallowed and every
/// matching rule overwrites the outcome with its action, so rule order matters. A rule
/// matches when all of its OS conditions match the host and all of its feature
/// conditions match the feature set, features not present in the set read as false.
pub fn eval(rules: &[Rule], features: &HashSet<String>, host: &Host) -> bool {

    if rules.is_empty() {
        return true;
    }

    let mut allowed = false;

    for rule in rules {
        match eval_rule(rule, features, host) {
            Some(RuleAction::Allow) => allowed = true,
            Some(RuleAction::Disallow) => allowed = false,
            None => (),
        }
    }

    allowed

}

/// Evaluate a single rule, returning its action if the rule matches the host and
/// features, or none if it doesn't apply.
fn eval_rule(rule: &Rule, features: &HashSet<String>, host: &Host) -> Option<RuleAction> {

    if !eval_rule_os(&rule.os, host) {
        return None;
    }

    for (feature, feature_expected) in &rule.features {
        if features.contains(feature) != *feature_expected {
            return None;
        }
    }

    Some(rule.action)

}

/// Return true if the OS conditions of a rule match the host. Conditions on facts the
/// host doesn't provide (unknown OS or arch) never match.
fn eval_rule_os(rule_os: &RuleOs, host: &Host) -> bool {

    if let Some(name) = &rule_os.name {
        if host.name != Some(name.as_str()) {
            return false;
        }
    }

    if let Some(arch) = &rule_os.arch {
        if host.arch != Some(arch.as_str()) {
            return false;
        }
    }

    if let Some(version) = &rule_os.version {
        match &host.version {
            Some(host_version) => {
                if !version.is_match(host_version) {
                    return false;
                }
            }
            None => return false,
        }
    }

    true

}

#[cfg(test)]
mod tests {

    use std::collections::HashSet;

    use crate::version::serde::Rule;
    use super::{eval, Host};

    fn linux_host() -> Host {
        Host {
            name: Some("linux"),
            arch: Some("x86_64"),
            bits: Some("64"),
            version: Some("6.1".to_string()),
        }
    }

    fn rules(raw: &str) -> Vec<Rule> {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn empty_allowed() {
        assert!(eval(&[], &HashSet::new(), &linux_host()));
    }

    #[test]
    fn os_match() {

        let host = linux_host();
        let features = HashSet::new();

        assert!(eval(&rules(r#"[{"action": "allow"}]"#), &features, &host));
        assert!(!eval(&rules(r#"[{"action": "disallow"}]"#), &features, &host));
        assert!(eval(&rules(r#"[{"action": "allow", "os": {"name": "linux"}}]"#), &features, &host));
        assert!(!eval(&rules(r#"[{"action": "allow", "os": {"name": "osx"}}]"#), &features, &host));
        assert!(eval(&rules(r#"[{"action": "allow", "os": {"name": "linux", "arch": "x86_64"}}]"#), &features, &host));
        assert!(!eval(&rules(r#"[{"action": "allow", "os": {"arch": "x86"}}]"#), &features, &host));

        // Typical natives gating: allowed everywhere but osx.
        let lwjgl = rules(r#"[{"action": "allow"}, {"action": "disallow", "os": {"name": "osx"}}]"#);
        assert!(eval(&lwjgl, &features, &host));
        assert!(!eval(&lwjgl, &features, &Host { name: Some("osx"), ..linux_host() }));

    }

    #[test]
    fn os_version_regex() {

        let host = linux_host();
        let features = HashSet::new();

        assert!(eval(&rules(r#"[{"action": "allow", "os": {"version": "^6\\."}}]"#), &features, &host));
        assert!(!eval(&rules(r#"[{"action": "allow", "os": {"version": "^10\\."}}]"#), &features, &host));
        assert!(!eval(&rules(r#"[{"action": "allow", "os": {"version": "^6\\."}}]"#), &features, &Host { version: None, ..linux_host() }));

    }

    #[test]
    fn unknown_os_never_matches() {

        let host = Host { name: None, arch: None, bits: None, version: None };
        let conditional = rules(r#"[{"action": "allow", "os": {"name": "linux"}}]"#);

        assert!(!eval(&conditional, &HashSet::new(), &host));
        // An unconditional rule still applies.
        assert!(eval(&rules(r#"[{"action": "allow"}]"#), &HashSet::new(), &host));

    }

    #[test]
    fn features_match() {

        let host = linux_host();
        let demo = rules(r#"[{"action": "allow", "features": {"is_demo_user": true}}]"#);

        let mut features = HashSet::new();
        assert!(!eval(&demo, &features, &host));

        features.insert("is_demo_user".to_string());
        assert!(eval(&demo, &features, &host));

        // Unknown feature keys are treated as false.
        let other = rules(r#"[{"action": "allow", "features": {"has_custom_resolution": false}}]"#);
        assert!(eval(&other, &features, &host));

    }

}
