//! Pure rendering and decision engine shared by the controller and the
//! agent: validator, merger, hasher, revision builder (C1–C4), diff engine
//! (C8), and reboot decider (C9). Nothing here performs I/O beyond the
//! injected `mco_contracts::ObjectStore`.

pub mod diff;
pub mod hash;
pub mod merge;
pub mod reboot_decision;
pub mod render;
pub mod revision_builder;
pub mod validate;

pub use diff::{diff_files, diff_units, Change, ChangeType};
pub use hash::{hash as hash_merged, Hash};
pub use merge::{merge as merge_fragments, MergedConfig};
pub use reboot_decision::{decide as decide_reboot, RebootDecision, RebootMethod};
pub use render::{render_pool, RenderError};
pub use revision_builder::{build_revision, BuildError, BuildOutcome, BuildResult};
pub use validate::{validate_all, validate_fragment};
