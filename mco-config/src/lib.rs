//! Ambient stack shared by `mco-agent` and `mco-controller`: tracing
//! bootstrap, `.env` loading, and a cooperative shutdown signal. Kept as
//! its own crate the way the teacher keeps configuration/CLI scaffolding
//! separate from domain logic (`ferrex-config` vs. `ferrex-core`).

pub mod local_state;
pub mod shutdown;

pub use shutdown::Shutdown;

/// Load a `.env` file if present (missing file is not an error) and
/// initialize a `tracing-subscriber` registry driven by `RUST_LOG`,
/// defaulting to `info` when unset.
pub fn init(default_filter: &str) {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
