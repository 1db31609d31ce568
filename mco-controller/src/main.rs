use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use mco_config::Shutdown;
use mco_contracts::testing::{InMemoryObjectStore, InMemoryPodManager};
use mco_controller::cli::Args;
use mco_controller::drain_exclusions::DrainExclusions;
use mco_controller::pool_controller::{self, PoolController};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    mco_config::init("info");
    let args = Args::parse();

    let doc = match mco_config::local_state::load(&args.local_state).await {
        Ok(doc) => doc,
        Err(e) => {
            error!(error = %e, "failed to load local state document");
            std::process::exit(1);
        }
    };

    let exclusions = match &args.drain_exclusions {
        Some(path) => match tokio::fs::read_to_string(path).await {
            Ok(raw) => match DrainExclusions::parse(&raw) {
                Ok(e) => e,
                Err(e) => {
                    error!(error = %e, "failed to parse drain exclusions document");
                    std::process::exit(1);
                }
            },
            Err(e) => {
                error!(path, error = %e, "failed to read drain exclusions document");
                std::process::exit(1);
            }
        },
        None => DrainExclusions::default(),
    };

    let store: &'static InMemoryObjectStore = Box::leak(Box::new(InMemoryObjectStore::new()));
    let pods: &'static InMemoryPodManager = Box::leak(Box::new(InMemoryPodManager::new()));
    let pool_names: Vec<String> = doc.pools.iter().map(|p| p.name.clone()).collect();
    mco_config::local_state::seed_pods(pods, &doc);
    mco_config::local_state::seed(store, doc);

    if pool_names.is_empty() {
        warn!("local state document declares no pools, controller has nothing to reconcile");
    }

    let controller = Arc::new(PoolController::new(store, pods, exclusions, args.self_node_name.clone()));
    let interval = Duration::from_secs(args.reconcile_interval_seconds);

    let (handle, shutdown) = Shutdown::new();
    Shutdown::on_ctrl_c(handle);

    let mut tasks = Vec::new();
    for pool_name in pool_names {
        let controller = controller.clone();
        let mut shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                if let Err(e) = controller.reconcile(&pool_name, Utc::now()).await {
                    error!(pool = %pool_name, error = %e, "pool reconcile failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.wait() => break,
                }
            }
            info!(pool = %pool_name, "pool worker shut down");
        }));
    }

    {
        let mut shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                if let Err(e) = pool_controller::detect_overlaps(store, Utc::now()).await {
                    error!(error = %e, "pool overlap sweep failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.wait() => break,
                }
            }
            info!("overlap sweep worker shut down");
        }));
    }

    info!(pools = tasks.len() - 1, "controller started, one worker per pool plus an overlap sweep");
    for task in tasks {
        let _ = task.await;
    }
}
