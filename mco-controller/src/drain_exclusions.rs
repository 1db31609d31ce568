//! Parser and matcher for the drain-exclusions ConfigMap document
//! (`spec.md` §6): `{defaults:{...}, rules:[{...}]}`.

use mco_model::Pod;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DrainExclusionsError {
    #[error("parsing drain-exclusions document: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    #[serde(default)]
    pub skip_tolerate_all_pods: bool,
    #[serde(default = "default_max_eviction_attempts")]
    pub max_eviction_attempts: u32,
}

fn default_max_eviction_attempts() -> u32 {
    5
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            skip_tolerate_all_pods: false,
            max_eviction_attempts: default_max_eviction_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub namespace_prefixes: Vec<String>,
    #[serde(default)]
    pub pod_name_patterns: Vec<String>,
    #[serde(default)]
    pub pod_selector: Vec<(String, String)>,
}

impl Rule {
    fn matches(&self, pod: &Pod) -> bool {
        if self.namespaces.iter().any(|ns| ns == &pod.namespace) {
            return true;
        }
        if self
            .namespace_prefixes
            .iter()
            .any(|prefix| pod.namespace.starts_with(prefix.as_str()))
        {
            return true;
        }
        if self
            .pod_name_patterns
            .iter()
            .any(|pattern| glob_match(pattern, &pod.name))
        {
            return true;
        }
        if !self.pod_selector.is_empty()
            && self
                .pod_selector
                .iter()
                .all(|(k, v)| pod.labels.get(k).map(|lv| lv == v).unwrap_or(false))
        {
            return true;
        }
        false
    }
}

/// A minimal `*`-glob matcher: at most one wildcard, prefix/suffix/exact.
/// Good enough for `kube-system-*`/`*-canary` style name patterns without
/// pulling in a regex dependency for a single use site.
fn glob_match(pattern: &str, value: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == value,
        Some((prefix, suffix)) => {
            value.len() >= prefix.len() + suffix.len()
                && value.starts_with(prefix)
                && value.ends_with(suffix)
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrainExclusions {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl DrainExclusions {
    pub fn parse(yaml: &str) -> Result<Self, DrainExclusionsError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// `true` when this pod should never be considered for eviction.
    pub fn is_excluded(&self, pod: &Pod) -> bool {
        if pod.daemon_owned {
            return true;
        }
        if pod.tolerates_all_taints && self.defaults.skip_tolerate_all_pods {
            return true;
        }
        self.rules.iter().any(|rule| rule.matches(pod))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_platform_document_shape() {
        let yaml = r#"
defaults:
  skipToleratAllPods: true
  maxEvictionAttempts: 3
rules:
  - namespaces: ["kube-system"]
  - namespacePrefixes: ["monitoring-"]
  - podNamePatterns: ["*-canary"]
  - podSelector:
      - ["app", "logging-agent"]
"#;
        let exclusions = DrainExclusions::parse(yaml).unwrap();
        assert!(exclusions.defaults.skip_tolerate_all_pods);
        assert_eq!(exclusions.defaults.max_eviction_attempts, 3);
        assert_eq!(exclusions.rules.len(), 4);
    }

    #[test]
    fn namespace_prefix_and_name_pattern_and_selector_rules_match() {
        let exclusions = DrainExclusions {
            defaults: Defaults::default(),
            rules: vec![
                Rule {
                    namespace_prefixes: vec!["monitoring-".to_string()],
                    ..Default::default()
                },
                Rule {
                    pod_name_patterns: vec!["*-canary".to_string()],
                    ..Default::default()
                },
            ],
        };

        let mut by_prefix = Pod::new("monitoring-prod", "exporter-0");
        assert!(exclusions.is_excluded(&by_prefix));

        let by_pattern = Pod::new("default", "checkout-canary");
        assert!(exclusions.is_excluded(&by_pattern));

        let unmatched = Pod::new("default", "checkout");
        assert!(!exclusions.is_excluded(&unmatched));

        by_prefix.namespace = "default".to_string();
        assert!(!exclusions.is_excluded(&by_prefix));
    }

    #[test]
    fn daemon_owned_and_tolerate_all_are_always_or_conditionally_excluded() {
        let mut daemon = Pod::new("kube-system", "node-exporter");
        daemon.daemon_owned = true;
        let exclusions = DrainExclusions::default();
        assert!(exclusions.is_excluded(&daemon));

        let mut tolerant = Pod::new("default", "privileged-debug");
        tolerant.tolerates_all_taints = true;
        assert!(!exclusions.is_excluded(&tolerant));

        let exclusions_skipping = DrainExclusions {
            defaults: Defaults {
                skip_tolerate_all_pods: true,
                ..Default::default()
            },
            rules: vec![],
        };
        assert!(exclusions_skipping.is_excluded(&tolerant));
    }
}
