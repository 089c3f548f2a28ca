//! Management server command: `harbor serve`.

use anyhow::Result;

use harbor::config::HarborConfig;
use harbor::host::server::{ServerConfig, start_server};

pub async fn cmd_serve(config: &HarborConfig) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    start_server(ServerConfig::from(config)).await
}
