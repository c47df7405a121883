//! Configuration loading and types for Stowage.
//!
//! Configuration is read from the process environment exactly once at
//! startup and treated as immutable afterwards.  Each subsection governs a
//! different part of the system: networking, authentication, and object
//! storage.

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Authentication settings (the single shared credential).
    pub auth: AuthConfig,

    /// Object storage settings.
    pub storage: StorageConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host address.
    pub host: String,

    /// Bind port.
    pub port: u16,
}

/// Authentication settings.
///
/// The service authorizes every non-presigned request against this one
/// credential pair.  The secret also keys presigned-URL signatures.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Access key identifier.
    pub access_key_id: String,

    /// Secret access key.  Never logged, never echoed in responses.
    pub secret_access_key: String,
}

/// Object storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory under which buckets live.
    pub root: String,
}

// -- Defaults ----------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8191
}

fn default_storage_root() -> String {
    "./data".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Read a variable under its `STOWAGE_`-prefixed name first, then the bare
/// name, so both `STOWAGE_ACCESS_KEY_ID` and `ACCESS_KEY_ID` work.
fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("STOWAGE_{name}"))
        .or_else(|_| std::env::var(name))
        .ok()
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// `ACCESS_KEY_ID` and `SECRET_ACCESS_KEY` are required; everything else
    /// falls back to a default.  Fails with a descriptive error when a
    /// required variable is missing or a numeric variable does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let access_key_id = env_var("ACCESS_KEY_ID")
            .ok_or_else(|| anyhow::anyhow!("ACCESS_KEY_ID environment variable is required"))?;
        let secret_access_key = env_var("SECRET_ACCESS_KEY")
            .ok_or_else(|| anyhow::anyhow!("SECRET_ACCESS_KEY environment variable is required"))?;

        let port = match env_var("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("PORT must be a number between 1 and 65535: {raw}"))?,
            None => default_port(),
        };

        Ok(Self {
            server: ServerConfig {
                host: env_var("HOST").unwrap_or_else(default_host),
                port,
            },
            auth: AuthConfig {
                access_key_id,
                secret_access_key,
            },
            storage: StorageConfig {
                root: env_var("STORAGE_PATH").unwrap_or_else(default_storage_root),
            },
        })
    }

    /// The `host:port` string the listener binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
