use clap::Parser;

use crate::config::{AppConfig, StoreBackend};

#[derive(Debug, Parser)]
#[command(name = "docbase-gateway")]
#[command(about = "Schema-aware REST gateway for registered document databases")]
#[command(version)]
pub struct ServerArgs {
    #[arg(long, help = "Port to listen on (overrides PORT / GATEWAY_PORT)")]
    pub port: Option<u16>,

    #[arg(long, value_parser = parse_store, help = "Document store backend: mongodb or memory")]
    pub store: Option<StoreBackend>,

    #[arg(long, help = "PostgreSQL URL for project and schema metadata")]
    pub database_url: Option<String>,
}

impl ServerArgs {
    /// Apply command-line overrides on top of the environment configuration
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(store) = self.store {
            config.server.store = store;
        }
        if let Some(url) = &self.database_url {
            config.database.url = Some(url.clone()).filter(|u| !u.trim().is_empty());
        }
        config
    }
}

fn parse_store(value: &str) -> Result<StoreBackend, String> {
    StoreBackend::parse(value).ok_or_else(|| format!("unknown store '{}', expected mongodb or memory", value))
}
