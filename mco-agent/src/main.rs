use std::time::Duration;

use clap::Parser;
use mco_agent::agent_loop::AgentLoop;
use mco_agent::cli::Args;
use mco_agent::node_annotator::ObjectStoreAnnotator;
use mco_agent::system_reboot::SystemRebootExecutor;
use mco_agent::system_service_manager::SystemServiceManager;
use mco_contracts::annotator::NodeAnnotationWriter;
use mco_contracts::object_store::ObjectStore;
use mco_contracts::reboot::RebootExecutor;
use mco_contracts::service_manager::ServiceManager;
use mco_contracts::testing::{InMemoryObjectStore, NoopRebootExecutor, NoopServiceManager};
use mco_config::Shutdown;
use tracing::{error, info, warn};

const STARTUP_POLL_INTERVAL: Duration = Duration::from_secs(5);
const STARTUP_POLL_CAP: Duration = Duration::from_secs(120);

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
    let store = InMemoryObjectStore::new();
    mco_config::local_state::seed(&store, doc);

    let service_manager: Box<dyn ServiceManager> = if args.skip_systemd {
        Box::new(NoopServiceManager)
    } else {
        Box::new(SystemServiceManager)
    };
    let executor: Box<dyn RebootExecutor> = if args.no_reboot {
        Box::new(NoopRebootExecutor::default())
    } else {
        Box::new(SystemRebootExecutor)
    };

    if let Err(e) = wait_for_node(&store, &args.node_name).await {
        error!(node = %args.node_name, error = %e, "node never became fetchable, exiting");
        std::process::exit(1);
    }

    let annotator = ObjectStoreAnnotator::new(&store);
    let mut agent_loop = AgentLoop::new(
        args.node_name.clone(),
        &store,
        &annotator,
        service_manager.as_ref(),
        executor.as_ref(),
        args.host_root.clone(),
        !args.skip_ownership,
    );

    if let Err(e) = agent_loop.detect_startup_reboot().await {
        warn!(error = %e, "startup reboot detection failed, continuing anyway");
    }
    if let Err(e) = annotator
        .set_state(&args.node_name, mco_model::AgentState::Idle)
        .await
    {
        warn!(error = %e, "failed to set initial idle state");
    }

    let (handle, shutdown) = Shutdown::new();
    Shutdown::on_ctrl_c(handle);

    info!(node = %args.node_name, "agent starting watch loop");
    agent_loop.run(shutdown).await;
    info!(node = %args.node_name, "agent shutting down");
}

async fn wait_for_node(
    store: &dyn ObjectStore,
    node_name: &str,
) -> Result<(), mco_contracts::object_store::StoreError> {
    let mut waited = Duration::ZERO;
    loop {
        match store.get_node(node_name).await {
            Ok(_) => return Ok(()),
            Err(e) if waited >= STARTUP_POLL_CAP => return Err(e),
            Err(e) => {
                warn!(node = node_name, error = %e, "node not yet fetchable, retrying");
                tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
                waited += STARTUP_POLL_INTERVAL;
            }
        }
    }
}
