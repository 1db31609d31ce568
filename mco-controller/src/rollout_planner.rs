//! C13 — Rollout Planner. Pure: `(nodes, target, policy, excluded) -> next
//! batch to start updating`, bounded by `max-unavailable`.

use std::collections::BTreeSet;

use mco_model::{AgentState, MaxUnavailable, NodeObject};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutPlan {
    pub updated: Vec<String>,
    pub updating: Vec<String>,
    pub candidates: Vec<String>,
    /// The subset of `candidates`, in lexicographic order, the controller
    /// should start updating this tick.
    pub next_batch: Vec<String>,
}

/// `nodes` must already be narrowed to the pool's node-selector matches.
/// `excluded` is the set of node names another pool also claims
/// (`PoolOverlap`) — these are never chosen as candidates for either pool.
pub fn plan(
    nodes: &[NodeObject],
    target_revision: &str,
    max_unavailable: &MaxUnavailable,
    excluded: &BTreeSet<String>,
) -> RolloutPlan {
    let total = nodes.len() as u32;
    let cap = max_unavailable.resolve(total);

    let mut updated = Vec::new();
    let mut updating = Vec::new();
    let mut candidates = Vec::new();

    for node in nodes {
        let typed = node.typed_annotations();

        if typed.current_revision.as_deref() == Some(target_revision)
            && matches!(typed.agent_state, Some(AgentState::Done) | Some(AgentState::Idle))
        {
            updated.push(node.name.clone());
            continue;
        }

        let in_drain = typed.cordoned && typed.drain_started_at.is_some();
        let reboot_in_flight_for_target =
            typed.reboot_pending && typed.desired_revision.as_deref() == Some(target_revision);
        if typed.agent_state == Some(AgentState::Applying) || in_drain || reboot_in_flight_for_target {
            updating.push(node.name.clone());
            continue;
        }

        if typed.paused || excluded.contains(&node.name) {
            continue;
        }

        candidates.push(node.name.clone());
    }

    candidates.sort();

    let room = cap.saturating_sub(updating.len() as u32) as usize;
    let next_batch = candidates.iter().take(room).cloned().collect();

    RolloutPlan {
        updated,
        updating,
        candidates,
        next_batch,
    }
}
