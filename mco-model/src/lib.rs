//! Shared data model for the machine-config operator.
//!
//! These types describe the four CRD-shaped objects in the
//! `mco.in-cloud.io/v1alpha1` group (`MachineConfig`, `MachineConfigPool`,
//! `RenderedMachineConfig`) plus the per-node annotation schema. None of the
//! types here depend on a specific cluster client — object-store access is a
//! capability injected by `mco-contracts`.

pub mod condition;
pub mod error;
pub mod fragment;
pub mod node;
pub mod pod;
pub mod pool;
pub mod revision;

pub use condition::{Condition, ConditionStatus, ConditionType};
pub use error::{ModelError, Result};
pub use fragment::{Fragment, FileSpec, FileState, UnitSpec, UnitState, Tristate};
pub use node::{AgentState, AnnotationPatch, NodeAnnotations, NodeObject, PatchValue};
pub use pod::Pod;
pub use pool::{MachineConfigPool, MaxUnavailable, PoolStatus, RebootPolicy, RebootStrategy, RolloutPolicy};
pub use revision::{RenderedRevision, RevisionSource};

/// Fully qualified API group for every object this crate describes.
pub const API_GROUP: &str = "mco.in-cloud.io/v1alpha1";

/// Namespace prefix used by every node annotation key (see `node::Keys`).
pub const ANNOTATION_PREFIX: &str = "mco.in-cloud.io";
