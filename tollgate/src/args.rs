use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Tollgate LLM gateway
#[derive(Debug, Parser)]
#[command(name = "tollgate", about = "Model failover, rate limiting and cost accounting for LLM traffic")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tollgate.toml", env = "TOLLGATE_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "TOLLGATE_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Start without checking chain models against provider catalogs
    #[arg(long)]
    pub skip_catalog_check: bool,
}
