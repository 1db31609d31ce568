use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "mco-agent", about = "Per-node machine-config reconcile agent")]
pub struct Args {
    /// Name of the node object this agent reconciles.
    #[arg(long, env = "NODE_NAME")]
    pub node_name: String,

    /// Root the agent treats as the host filesystem when applying files.
    #[arg(long, env = "MCO_HOST_ROOT", default_value = "/host")]
    pub host_root: String,

    /// YAML document seeding the local object-store (pools/fragments/nodes).
    #[arg(long, env = "MCO_LOCAL_STATE", default_value = "/etc/mco-agent/local-state.yaml")]
    pub local_state: String,

    /// Use a no-op service manager instead of shelling out to systemctl.
    #[arg(long, env = "MCO_SKIP_SYSTEMD", default_value_t = false)]
    pub skip_systemd: bool,

    /// Use a no-op reboot executor instead of invoking `systemctl reboot`.
    #[arg(long, env = "MCO_NO_REBOOT", default_value_t = false)]
    pub no_reboot: bool,

    /// Skip chown when applying files (useful without root privileges).
    #[arg(long, env = "MCO_SKIP_OWNERSHIP", default_value_t = false)]
    pub skip_ownership: bool,
}
