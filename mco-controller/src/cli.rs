use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "mco-controller", about = "Central pool reconcile controller")]
pub struct Args {
    /// YAML document seeding the local object-store (pools/fragments/nodes).
    #[arg(long, env = "MCO_LOCAL_STATE", default_value = "/etc/mco-controller/local-state.yaml")]
    pub local_state: String,

    /// YAML document describing drain exclusions (`defaults`/`rules`).
    #[arg(long, env = "MCO_DRAIN_EXCLUSIONS")]
    pub drain_exclusions: Option<String>,

    /// Node name this controller process itself runs on, so its own pod's
    /// node is never cordoned or drained.
    #[arg(long, env = "MCO_SELF_NODE_NAME", default_value = "")]
    pub self_node_name: String,

    /// Seconds between reconcile ticks per pool.
    #[arg(long, env = "MCO_RECONCILE_INTERVAL_SECONDS", default_value_t = 10)]
    pub reconcile_interval_seconds: u64,
}
