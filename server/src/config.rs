use blocks_shared::config::SessionConfig;

const DEFAULT_PORT: u16 = 3000;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Capacity of the socket -> relay command channel.
    pub command_capacity: usize,
    /// Frames a peer may fall behind before the oldest are dropped.
    pub broadcast_capacity: usize,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            command_capacity: 1024,
            broadcast_capacity: 128,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, with the listen port taken from `PORT` when set.
    pub fn from_env() -> Result<Self, String> {
        Self::from_port_var(std::env::var("PORT").ok().as_deref())
    }

    fn from_port_var(port: Option<&str>) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(port) = port {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| format!("PORT must be a port number, got {port:?}"))?;
            config.listen_addr = format!("0.0.0.0:{port}");
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.command_capacity == 0 {
            return Err("command_capacity must be > 0".to_string());
        }
        if self.broadcast_capacity == 0 {
            return Err("broadcast_capacity must be > 0".to_string());
        }
        self.session.validate()
    }
}
