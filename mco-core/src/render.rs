//! Glues C1–C4 together: validate, merge, hash, build. This is what the
//! pool controller (`mco-controller::pool_controller`) calls once per
//! reconcile tick per pool.

use mco_contracts::ObjectStore;
use mco_model::{Fragment, MachineConfigPool, ModelError};
use thiserror::Error;

use crate::merge::merge;
use crate::revision_builder::{build_revision, BuildError, BuildResult};
use crate::validate::validate_all;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<ModelError>),

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Validate, merge, hash and persist a revision for `pool` from
/// `fragments`. Fragments are validated again here even though a well
/// behaved admission path already validated them at creation time — this
/// is the "safety net post-merge" `spec.md` §4.1 calls for.
pub async fn render_pool(
    store: &dyn ObjectStore,
    pool: &MachineConfigPool,
    fragments: &[Fragment],
) -> Result<BuildResult, RenderError> {
    validate_all(fragments).map_err(RenderError::Validation)?;
    let merged = merge(fragments);
    let result = build_revision(store, pool, &merged).await?;
    Ok(result)
}
