use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::{ModelError, Result};

/// `maxUnavailable`: either a literal node count or a percentage string
/// such as `"10%"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxUnavailable {
    Count(u32),
    Percent(u32),
}

impl Default for MaxUnavailable {
    fn default() -> Self {
        MaxUnavailable::Count(1)
    }
}

impl MaxUnavailable {
    /// Parse either an integer or a `"<N>%"` string.
    pub fn parse(raw: &str) -> Result<Self> {
        if let Some(pct) = raw.strip_suffix('%') {
            let value: u32 = pct
                .parse()
                .map_err(|_| ModelError::InvalidMaxUnavailable(raw.to_string()))?;
            return Ok(MaxUnavailable::Percent(value));
        }
        raw.parse()
            .map(MaxUnavailable::Count)
            .map_err(|_| ModelError::InvalidMaxUnavailable(raw.to_string()))
    }

    /// Resolve against a total node count, clamped to `[1, total]`.
    /// `total == 0` resolves to `0` (nothing to disrupt).
    pub fn resolve(&self, total: u32) -> u32 {
        if total == 0 {
            return 0;
        }
        let raw = match self {
            MaxUnavailable::Count(n) => *n,
            MaxUnavailable::Percent(p) => {
                ((u64::from(*p) * u64::from(total)).div_ceil(100)) as u32
            }
        };
        raw.clamp(1, total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutPolicy {
    pub debounce_seconds: u32,
    pub apply_timeout_seconds: u32,
    pub drain_timeout_seconds: u32,
    pub drain_retry_seconds: u32,
}

impl RolloutPolicy {
    pub const MAX_UNAVAILABLE_DEFAULT: u32 = 1;
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self {
            debounce_seconds: 30,
            apply_timeout_seconds: 600,
            drain_timeout_seconds: 600,
            drain_retry_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RebootStrategy {
    Never,
    IfRequired,
}

impl Default for RebootStrategy {
    fn default() -> Self {
        RebootStrategy::Never
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebootPolicy {
    pub strategy: RebootStrategy,
    pub min_interval_seconds: u32,
}

impl Default for RebootPolicy {
    fn default() -> Self {
        Self {
            strategy: RebootStrategy::Never,
            min_interval_seconds: 1800,
        }
    }
}

/// Per-pool machine counts surfaced on status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineCounts {
    pub total: u32,
    pub ready: u32,
    pub updated: u32,
    pub updating: u32,
    pub degraded: u32,
    pub unavailable: u32,
    pub pending_reboot: u32,
    pub cordoned: u32,
    pub draining: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_revision: Option<String>,
    pub machine_counts: MachineCounts,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfigPool {
    pub name: String,
    /// label selector matching node labels, as raw `key=value` pairs.
    pub node_selector: Vec<(String, String)>,
    /// label selector matching fragment pool-labels.
    pub machine_config_selector: Vec<(String, String)>,
    pub rollout: RolloutPolicy,
    pub max_unavailable: MaxUnavailable,
    pub reboot: RebootPolicy,
    #[serde(default = "default_retention")]
    pub revision_history_limit: u32,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub status: PoolStatus,
}

fn default_retention() -> u32 {
    5
}

impl MachineConfigPool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_selector: Vec::new(),
            machine_config_selector: Vec::new(),
            rollout: RolloutPolicy::default(),
            max_unavailable: MaxUnavailable::default(),
            reboot: RebootPolicy::default(),
            revision_history_limit: default_retention(),
            paused: false,
            status: PoolStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_unavailable_percent_rounds_up_and_clamps() {
        let mu = MaxUnavailable::Percent(10);
        assert_eq!(mu.resolve(5), 1);
        assert_eq!(mu.resolve(100), 10);
        assert_eq!(mu.resolve(1), 1);
        assert_eq!(mu.resolve(0), 0);
    }

    #[test]
    fn max_unavailable_count_clamps_to_total() {
        let mu = MaxUnavailable::Count(9);
        assert_eq!(mu.resolve(3), 3);
        assert_eq!(mu.resolve(20), 9);
    }

    #[test]
    fn max_unavailable_parse() {
        assert_eq!(MaxUnavailable::parse("3").unwrap(), MaxUnavailable::Count(3));
        assert_eq!(
            MaxUnavailable::parse("25%").unwrap(),
            MaxUnavailable::Percent(25)
        );
        assert!(MaxUnavailable::parse("bogus").is_err());
    }
}
