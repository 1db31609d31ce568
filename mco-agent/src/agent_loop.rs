//! C12 — Agent Loop. The per-node reconcile handler plus the
//! watch-reconnect driver described in `spec.md` §4.11.

use std::time::Duration;

use chrono::Utc;
use mco_contracts::annotator::NodeAnnotationWriter;
use mco_contracts::object_store::{ObjectStore, WatchEvent};
use mco_contracts::reboot::RebootExecutor;
use mco_contracts::service_manager::ServiceManager;
use mco_core::reboot_decision::decide;
use mco_model::node::NodeAnnotations;
use mco_model::{AgentState, NodeObject};
use thiserror::Error;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::apply::{FileApplier, UnitApplier};
use crate::boot::BootMarker;
use crate::cache::RevisionCache;
use crate::reboot_handler::{self, LastRebootStore};
use mco_config::Shutdown;

#[derive(Error, Debug)]
pub enum AgentLoopError {
    #[error("store: {0}")]
    Store(#[from] mco_contracts::object_store::StoreError),
    #[error("reboot handler: {0}")]
    Reboot(#[from] crate::reboot_handler::RebootHandlerError),
    #[error("boot marker: {0}")]
    Boot(#[from] crate::boot::BootError),
}

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct AgentLoop<'a> {
    node_name: String,
    store: &'a dyn ObjectStore,
    annotator: &'a dyn NodeAnnotationWriter,
    cache: RevisionCache,
    file_applier: FileApplier,
    service_manager: &'a dyn ServiceManager,
    boot_marker: BootMarker,
    last_reboot_store: LastRebootStore,
    executor: &'a dyn RebootExecutor,
    /// Set while this process requested a reboot that has not yet been
    /// confirmed via a fresh-boot boot-marker check; carried only within a
    /// process lifetime, not across restarts (the boot marker is the
    /// durable record for that).
    pending_reboot_revision: Option<String>,
}

impl<'a> AgentLoop<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_name: impl Into<String>,
        store: &'a dyn ObjectStore,
        annotator: &'a dyn NodeAnnotationWriter,
        service_manager: &'a dyn ServiceManager,
        executor: &'a dyn RebootExecutor,
        host_root: impl Into<std::path::PathBuf>,
        apply_ownership: bool,
    ) -> Self {
        let host_root = host_root.into();
        Self {
            node_name: node_name.into(),
            store,
            annotator,
            cache: RevisionCache::new(),
            file_applier: FileApplier::new(host_root.clone(), apply_ownership),
            service_manager,
            boot_marker: BootMarker::new(&host_root),
            last_reboot_store: LastRebootStore::new(&host_root),
            executor,
            pending_reboot_revision: None,
        }
    }

    /// Startup sequence (`spec.md` §4.11): if the boot marker is gone but
    /// the node's own annotations still show `reboot-pending=true`, the
    /// reboot this agent (or a prior process) requested has completed —
    /// finalize the transition using the annotations alone, since any
    /// in-memory `pending_reboot_revision` was lost with the old process.
    /// If the marker is still present, no host reboot has happened since
    /// it was armed; leave state untouched for the main loop to re-evaluate.
    pub async fn detect_startup_reboot(&self) -> Result<(), AgentLoopError> {
        if self.boot_marker.is_armed().await {
            warn!(node = %self.node_name, "boot marker still armed at startup; reboot has not occurred yet");
            return Ok(());
        }

        let node = self.store.get_node(&self.node_name).await?;
        let typed = node.typed_annotations();
        if typed.reboot_pending {
            let Some(revision) = typed.desired_revision.clone() else {
                warn!(node = %self.node_name, "reboot-pending set with no desired-revision, clearing");
                self.annotator.set_reboot_pending(&self.node_name, false).await?;
                return Ok(());
            };
            info!(node = %self.node_name, revision, "boot marker absent, reboot completed, finalizing");
            self.annotator.set_done(&self.node_name, &revision).await?;
        }
        Ok(())
    }

    /// Watch the node forever, reconciling on every event, reconnecting the
    /// stream whenever it closes, until `shutdown` fires.
    pub async fn run(&mut self, mut shutdown: Shutdown) {
        loop {
            if shutdown.is_triggered() {
                return;
            }

            let mut stream = match self.store.watch_node(&self.node_name).await {
                Ok(s) => s,
                Err(e) => {
                    error!(node = %self.node_name, error = %e, "failed to open node watch, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                        _ = shutdown.wait() => return,
                    }
                }
            };

            loop {
                tokio::select! {
                    event = stream.next() => {
                        match event {
                            Some(WatchEvent::Added(node)) | Some(WatchEvent::Modified(node)) => {
                                if let Err(e) = self.handle(&node).await {
                                    error!(node = %self.node_name, error = %e, "reconcile failed");
                                }
                            }
                            Some(WatchEvent::Deleted(_)) => {
                                info!(node = %self.node_name, "node object deleted, pausing until it returns");
                            }
                            None => {
                                warn!(node = %self.node_name, "watch stream closed, reconnecting");
                                break;
                            }
                        }
                    }
                    _ = shutdown.wait() => return,
                }
            }
        }
    }

    /// The per-event reconcile handler (`spec.md` §4.11 steps 1-8).
    async fn handle(&mut self, node: &NodeObject) -> Result<(), AgentLoopError> {
        let typed = node.typed_annotations();

        // 1
        if typed.paused {
            return Ok(());
        }

        // 2
        let Some(desired) = typed.desired_revision.clone() else {
            return Ok(());
        };

        // 3
        if typed.current_revision.as_deref() == Some(desired.as_str()) {
            return Ok(());
        }

        // 4
        let reboot_in_flight =
            self.pending_reboot_revision.as_deref() == Some(desired.as_str()) || typed.reboot_pending;
        if reboot_in_flight {
            return self.reevaluate_reboot_in_flight(&desired, &typed).await;
        }

        // 5 — fetch_with_backoff already exhausts transient retries itself,
        // so any error reaching here (not-found, permanent, or retries
        // exhausted) is handled inline rather than bubbled to the caller.
        let revision = match self.fetch_with_backoff(&desired).await {
            Ok(r) => r,
            Err(e) => {
                self.annotator
                    .set_state_with_error(&self.node_name, &e.to_string())
                    .await?;
                return Ok(());
            }
        };

        // 6
        self.annotator.set_state(&self.node_name, AgentState::Applying).await?;
        self.annotator.clear_last_error(&self.node_name).await?;

        let apply_timeout = Duration::from_secs(u64::from(revision.apply_timeout_seconds.max(1)));
        let unit_applier = UnitApplier::new(self.service_manager);
        let apply_outcome = tokio::time::timeout(apply_timeout, async {
            self.file_applier
                .apply_all(&revision.files)
                .await
                .map_err(|e| e.to_string())?;
            unit_applier.apply_all(&revision.units).await.map_err(|e| e.to_string())
        })
        .await;

        match apply_outcome {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                self.annotator.set_state_with_error(&self.node_name, &message).await?;
                return Ok(());
            }
            Err(_) => {
                warn!(node = %self.node_name, timeout_secs = revision.apply_timeout_seconds, "apply exceeded apply-timeout-seconds");
                self.annotator
                    .set_state_with_error(&self.node_name, "apply exceeded apply-timeout-seconds")
                    .await?;
                return Ok(());
            }
        }

        // 7
        let decision = decide(self.store, typed.current_revision.as_deref(), &revision).await;
        let reboot_requested = decision.required || typed.force_reboot;

        if reboot_requested {
            info!(node = %self.node_name, reasons = ?decision.reasons, force = typed.force_reboot, "reboot requested to complete transition");
            self.arm_reboot_state(&desired).await?;

            let outcome = reboot_handler::handle(
                &revision.reboot_policy,
                &decision,
                typed.force_reboot,
                Utc::now(),
                &self.last_reboot_store,
                self.executor,
            )
            .await?;

            if typed.force_reboot {
                self.annotator.clear_force_reboot(&self.node_name).await?;
            }
            if let reboot_handler::RebootOutcome::Executed = outcome {
                self.annotator
                    .set_state(&self.node_name, AgentState::Rebooting)
                    .await?;
            }
            self.pending_reboot_revision = Some(desired);
            return Ok(());
        }

        // 8
        self.pending_reboot_revision = None;
        self.annotator.set_done(&self.node_name, &desired).await?;
        Ok(())
    }

    /// Step 4's "do NOT re-apply" branch: re-evaluate the reboot handler
    /// (min-interval, strategy) against the already-applied revision, but
    /// never touch files/units or bump `current-revision` here. The
    /// transition out of this state only happens via
    /// `detect_startup_reboot` once the host has actually rebooted.
    async fn reevaluate_reboot_in_flight(
        &mut self,
        desired: &str,
        typed: &NodeAnnotations,
    ) -> Result<(), AgentLoopError> {
        let revision = self.fetch_with_backoff(desired).await?;
        let decision = decide(self.store, typed.current_revision.as_deref(), &revision).await;

        let outcome = reboot_handler::handle(
            &revision.reboot_policy,
            &decision,
            typed.force_reboot,
            Utc::now(),
            &self.last_reboot_store,
            self.executor,
        )
        .await?;

        if typed.force_reboot {
            self.annotator.clear_force_reboot(&self.node_name).await?;
        }
        if let reboot_handler::RebootOutcome::Executed = outcome {
            self.annotator
                .set_state(&self.node_name, AgentState::Rebooting)
                .await?;
        }
        self.pending_reboot_revision = Some(desired.to_string());
        Ok(())
    }

    async fn arm_reboot_state(&self, revision: &str) -> Result<(), AgentLoopError> {
        self.boot_marker.arm(revision).await?;
        self.annotator.set_reboot_pending(&self.node_name, true).await?;
        Ok(())
    }

    async fn fetch_with_backoff(
        &self,
        name: &str,
    ) -> Result<mco_model::RenderedRevision, mco_contracts::object_store::StoreError> {
        let mut delay = Duration::from_secs(5);
        const MAX_DELAY: Duration = Duration::from_secs(300);
        const MAX_TRIES: u32 = 5;
        let mut tries = 0;
        loop {
            match self.cache.get(self.store, name).await {
                Ok(revision) => return Ok(revision),
                Err(e) if e.is_transient() && tries < MAX_TRIES => {
                    tries += 1;
                    warn!(name, error = %e, tries, delay_secs = delay.as_secs(), "transient error fetching revision, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_DELAY);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
