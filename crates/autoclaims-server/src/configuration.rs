use autoclaims::chat::{ContextStore, DEFAULT_CONTEXT_CAPACITY};
use autoclaims::config::{section, ConfigError};
use config::Config;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Conversations whose customer details are remembered between turns.
    /// Zero turns the memory off.
    #[serde(default = "default_conversation_capacity")]
    pub conversation_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            conversation_capacity: default_conversation_capacity(),
        }
    }
}

impl ServerSettings {
    /// Read the `server` section, falling back to defaults when it is absent
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        match section(config, "server") {
            Ok(settings) => Ok(settings),
            Err(ConfigError::MissingEnvVar { .. }) => Ok(Self::default()),
            Err(err) => Err(err),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("server address: {}", e)))
    }

    pub fn context_store(&self) -> Option<ContextStore> {
        match self.conversation_capacity {
            0 => None,
            capacity => Some(ContextStore::with_capacity(capacity)),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_conversation_capacity() -> usize {
    DEFAULT_CONTEXT_CAPACITY
}
