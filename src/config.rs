use std::net::SocketAddr;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cni-agent",
    about = "Node-local cache for CNI plugin state",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the agent HTTP server (default).
    Run,
}

#[derive(clap::Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = "CNI_AGENT_BIND",
        value_name = "ADDR",
        default_value = "127.0.0.1:7443"
    )]
    pub bind: SocketAddr,

    #[arg(
        long = "shutdown-grace-secs",
        global = true,
        env = "CNI_AGENT_SHUTDOWN_GRACE_SECS",
        value_name = "SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..=60)
    )]
    pub shutdown_grace_secs: u64,
}
