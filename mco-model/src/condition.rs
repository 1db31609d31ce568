use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of typed conditions a pool status can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Updated,
    Updating,
    Degraded,
    RenderDegraded,
    PoolOverlap,
    DrainStuck,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Updated => "Updated",
            ConditionType::Updating => "Updating",
            ConditionType::Degraded => "Degraded",
            ConditionType::RenderDegraded => "RenderDegraded",
            ConditionType::PoolOverlap => "PoolOverlap",
            ConditionType::DrainStuck => "DrainStuck",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

/// A standardized `{type, status, reason, message, lastTransitionTime}` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_,
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self.status, ConditionStatus::True)
    }
}

/// Upsert a condition into a condition list, only bumping
/// `last_transition_time` when the status actually changed (conditions are
/// otherwise stable so repeated reconciles don't thrash timestamps).
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == new.type_) {
        if existing.status != new.status {
            existing.status = new.status;
            existing.last_transition_time = new.last_transition_time;
        }
        existing.reason = new.reason;
        existing.message = new.message;
    } else {
        conditions.push(new);
    }
}
