//! TOML node configuration, loaded the way the teacher's `reth-config` loads
//! its `reth.toml`: read the whole file, then parse it in one shot rather
//! than a field-by-field parse.

use engine_primitives::ChainSpec;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

fn default_addr() -> SocketAddr {
    "127.0.0.1:8551".parse().expect("valid default address")
}

fn default_block_store_capacity() -> usize {
    8_192
}

/// Everything the binary needs to stand up an [`engine_core::EngineCore`] and
/// serve it over JSON-RPC. Every field has a sensible default so an empty
/// TOML file (or no file at all) still produces a runnable node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,
    #[serde(default = "default_block_store_capacity")]
    pub block_store_capacity: usize,
    #[serde(default)]
    pub chain_spec: ChainSpec,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            block_store_capacity: default_block_store_capacity(),
            chain_spec: ChainSpec::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_toml_file(path: &Path) -> eyre::Result<Self> {
        tracing::info!(target: "engine-node::config", path = %path.display(), "loading node config");
        let data = std::fs::read_to_string(path)?;
        let config = toml::from_str(&data)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_falls_back_to_defaults() {
        let config: NodeConfig = toml::from_str("").unwrap();
        assert_eq!(config.addr, default_addr());
        assert_eq!(config.block_store_capacity, default_block_store_capacity());
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            addr = "0.0.0.0:9000"
            block_store_capacity = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.addr, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.block_store_capacity, 4096);
    }
}
