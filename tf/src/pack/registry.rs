//! Specialist registry - config-driven pack construction
//!
//! Wrapper composition order is a contract: the MCP wrapper goes on first,
//! the container wrapper outermost. The container redirects only the shell
//! tool, while MCP tools must keep running on the host regardless of the
//! shell container, so the order is enforced here, not at runtime.

use std::sync::Arc;

use eyre::{Result, bail};
use tracing::debug;

use crate::config::{Config, SpecialistConfig};

use super::base::{PackEnv, build_engineering, build_generic, build_research};
use super::container::{ContainerPack, ContainerRuntime};
use super::mcp_pack::McpPack;
use super::traits::SpecialistPack;

type PackFactory = fn(&SpecialistConfig, &PackEnv) -> super::base::BasePack;

/// Builds specialist packs from configuration
pub struct SpecialistRegistry {
    config: Config,
    container_runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl SpecialistRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            container_runtime: None,
        }
    }

    pub fn with_container_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.container_runtime = Some(runtime);
        self
    }

    /// Specialist ids in config declaration order
    pub fn specialist_ids(&self) -> Vec<String> {
        self.config.specialists.iter().map(|s| s.id.clone()).collect()
    }

    /// Declared capabilities per specialist, in declaration order
    pub fn capabilities(&self) -> Vec<(String, Vec<String>)> {
        self.config
            .specialists
            .iter()
            .map(|s| (s.id.clone(), s.capabilities.clone()))
            .collect()
    }

    /// Keyword lists per specialist, in declaration order
    pub fn keywords(&self) -> Vec<(String, Vec<String>)> {
        self.config
            .specialists
            .iter()
            .map(|s| (s.id.clone(), s.keywords.clone()))
            .collect()
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.config.specialist(id).is_some()
    }

    /// Construct the (wrapped) pack for a specialist id
    pub fn build(&self, id: &str, env: &PackEnv) -> Result<Box<dyn SpecialistPack>> {
        let Some(specialist_config) = self.config.specialist(id) else {
            bail!("Unknown specialist id: {}", id);
        };

        let factory = self.resolve_factory(specialist_config)?;
        let mut pack: Box<dyn SpecialistPack> = Box::new(factory(specialist_config, env));

        if !specialist_config.mcp_servers.is_empty() {
            debug!(%id, servers = specialist_config.mcp_servers.len(), "SpecialistRegistry: adding MCP wrapper");
            pack = Box::new(McpPack::new(pack, specialist_config.mcp_servers.clone()));
        }

        if let Some(image) = &specialist_config.container_image {
            let Some(runtime) = &self.container_runtime else {
                bail!("Specialist {} requires container image {} but no container runtime is configured", id, image);
            };
            debug!(%id, %image, "SpecialistRegistry: adding container wrapper");
            pack = Box::new(ContainerPack::new(pack, image.clone(), env.workspace.clone(), runtime.clone()));
        }

        Ok(pack)
    }

    fn resolve_factory(&self, specialist_config: &SpecialistConfig) -> Result<PackFactory> {
        let key = specialist_config.builder.as_deref().unwrap_or(&specialist_config.id);
        Ok(match key {
            "engineering" => build_engineering,
            "research" => build_research,
            _ if specialist_config.builder.is_some() => {
                bail!("Unknown pack builder: {}", key)
            }
            _ => build_generic,
        })
    }
}
