//! Node lifecycle

use crate::api::start_api_server;
use crate::runtime::SuretyRuntime;
use std::sync::Arc;
use surety_core::{AccountId, NodeConfig};
use tokio::signal;
use tracing::{error, info};

/// SURETY node serving one flight insurance service
pub struct SuretyNode {
    runtime: Arc<SuretyRuntime>,
}

impl SuretyNode {
    /// Create a new node
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        let runtime = Arc::new(SuretyRuntime::new(config)?);
        Ok(Self { runtime })
    }

    /// Start the node and serve until interrupted
    pub async fn start(&self) -> anyhow::Result<()> {
        info!("Starting SURETY node '{}'...", self.runtime.config().name);

        let mut background = self.runtime.spawn_background();

        let api_runtime = self.runtime.clone();
        let api_addr = self.runtime.config().api.listen_addr.clone();
        background.push(tokio::spawn(async move {
            if let Err(e) = start_api_server(api_runtime, &api_addr).await {
                error!("API server error: {}", e);
            }
        }));

        info!("Node started successfully");
        info!("Admin: {}", self.runtime.config().surety.admin);
        if let Some(founder) = self.runtime.config().founding_airline {
            info!("Founding airline: {}", founder);
        }

        // Wait for shutdown signal
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping node...");
            }
            Err(e) => {
                error!("Error waiting for shutdown signal: {}", e);
            }
        }

        for handle in background {
            handle.abort();
        }

        info!("Node stopped");

        Ok(())
    }

    /// Get runtime reference
    pub fn runtime(&self) -> &Arc<SuretyRuntime> {
        &self.runtime
    }
}

/// Node builder for easier configuration
pub struct NodeBuilder {
    config: NodeConfig,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
        }
    }

    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api_addr(mut self, addr: &str) -> Self {
        self.config.api.listen_addr = addr.to_string();
        self
    }

    pub fn admin(mut self, admin: AccountId) -> Self {
        self.config.surety.admin = admin;
        self
    }

    pub fn founding_airline(mut self, airline: AccountId) -> Self {
        self.config.founding_airline = Some(airline);
        self
    }

    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.surety.oracle.rng_seed = Some(seed);
        self
    }

    pub fn build(self) -> anyhow::Result<SuretyNode> {
        SuretyNode::new(self.config)
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
