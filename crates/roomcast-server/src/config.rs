use serde::Deserialize;

/// Top-level server configuration, loaded from `roomcast.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_connections: usize,
    /// Capacity of each member's outbound frame buffer. A member whose
    /// buffer overflows is pruned from its room during broadcast.
    pub member_message_buffer: usize,
    /// Maximum number of rooms that may exist at once.
    pub max_rooms: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 200,
            member_message_buffer: 256,
            max_rooms: 1024,
        }
    }
}

impl ServerConfig {
    /// Validate configuration, logging errors for fatal issues.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }
        if self.limits.max_connections == 0 {
            tracing::error!("limits.max_connections must be > 0");
            std::process::exit(1);
        }
        if self.limits.member_message_buffer == 0 {
            tracing::error!("limits.member_message_buffer must be > 0");
            std::process::exit(1);
        }
        if self.limits.max_rooms == 0 {
            tracing::error!("limits.max_rooms must be > 0");
            std::process::exit(1);
        }
    }

    /// Load config from `roomcast.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("roomcast.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from roomcast.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse roomcast.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No roomcast.toml found, using defaults");
                ServerConfig::default()
            },
        };

        // Environment variable overrides
        if let Ok(addr) = std::env::var("ROOMCAST_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("ROOMCAST_MAX_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.limits.max_connections = n;
        }
        if let Ok(val) = std::env::var("ROOMCAST_MEMBER_MESSAGE_BUFFER")
            && let Ok(n) = val.parse::<usize>()
        {
            config.limits.member_message_buffer = n;
        }
        if let Ok(val) = std::env::var("ROOMCAST_MAX_ROOMS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.limits.max_rooms = n;
        }

        config
    }
}
