//! Capability traits standing in for the external collaborators `spec.md`
//! §1 declares out of scope: the cluster object-store/watch primitives, the
//! service-manager IPC, and the reboot executor. Production code programs
//! against these traits; the `testing` feature provides in-memory/no-op
//! implementations shared by unit tests and by the agent's
//! `--skip-systemd`/`--no-reboot` flags.

pub mod annotator;
pub mod object_store;
pub mod pod_manager;
pub mod reboot;
pub mod service_manager;

pub use annotator::NodeAnnotationWriter;
pub use object_store::{ObjectStore, StoreError, StoreResult, WatchEvent};
pub use pod_manager::{PodManager, PodManagerError};
pub use reboot::RebootExecutor;
pub use service_manager::{ActiveState, ServiceManager, UnitFileState};

#[cfg(feature = "testing")]
pub mod testing;
