//! TOML configuration with per-field serde defaults.
//!
//! Loaded from `~/.authgate/config.toml` by default; every field falls back
//! to a sane default so an empty (or missing) file yields a runnable config.
//! The signing secret may come from the `AUTHGATE_SECRET` environment
//! variable, which takes precedence over the file.

use anyhow::{Context, Result};
use rand::RngCore;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Access tokens live 30 minutes unless configured otherwise.
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 30 * 60;
/// Refresh tokens live 14 days unless configured otherwise.
pub const DEFAULT_REFRESH_TTL_SECS: u64 = 14 * 24 * 3600;

/// Configurable access-token lifetime bounds (15 to 60 minutes).
const ACCESS_TTL_RANGE_SECS: (u64, u64) = (15 * 60, 60 * 60);
/// Configurable refresh-token lifetime bounds (7 to 30 days).
const REFRESH_TTL_RANGE_SECS: (u64, u64) = (7 * 24 * 3600, 30 * 24 * 3600);

/// Default PBKDF2 round count for password hashing.
const DEFAULT_PASSWORD_ROUNDS: u32 = 600_000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
}

/// `[gateway]` section: bind address.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8600,
        }
    }
}

/// `[auth]` section: signing secret, token lifetimes, password cost.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token signing secret. When absent here and in `AUTHGATE_SECRET`,
    /// an ephemeral secret is generated at startup.
    pub secret: Option<String>,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    /// PBKDF2 round count. Lower it in test configs; never in production.
    pub password_rounds: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
            password_rounds: DEFAULT_PASSWORD_ROUNDS,
        }
    }
}

/// `[store]` section: account persistence backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// "sqlite" (persistent) or "memory" (ephemeral, for local trials).
    pub backend: String,
    /// SQLite database path. Defaults to `<workspace>/authgate.db`.
    pub db_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".into(),
            db_path: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location when
    /// `path` is `None`. A missing file is not an error; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config at {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse config at {}", path.display()))?
        } else {
            Self::default()
        };

        config.clamp_ttls();
        Ok(config)
    }

    /// Resolve the token signing secret. Precedence: `AUTHGATE_SECRET`
    /// environment variable, then `[auth] secret`, then a fresh random
    /// secret valid only for this process.
    pub fn resolve_secret(&self) -> String {
        if let Ok(secret) = std::env::var("AUTHGATE_SECRET") {
            let trimmed = secret.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
        if let Some(ref secret) = self.auth.secret {
            let trimmed = secret.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }

        tracing::warn!(
            "no signing secret configured; using an ephemeral one (issued tokens will not survive a restart)"
        );
        generate_secret()
    }

    /// SQLite database path: configured value or `<workspace>/authgate.db`.
    pub fn db_path(&self) -> PathBuf {
        match self.store.db_path {
            Some(ref p) => p.clone(),
            None => workspace_dir().join("authgate.db"),
        }
    }

    /// Force out-of-range token lifetimes back into their supported windows.
    fn clamp_ttls(&mut self) {
        let (lo, hi) = ACCESS_TTL_RANGE_SECS;
        if self.auth.access_ttl_secs < lo || self.auth.access_ttl_secs > hi {
            let clamped = self.auth.access_ttl_secs.clamp(lo, hi);
            tracing::warn!(
                configured = self.auth.access_ttl_secs,
                clamped,
                "access_ttl_secs outside 15-60 minutes; clamping"
            );
            self.auth.access_ttl_secs = clamped;
        }

        let (lo, hi) = REFRESH_TTL_RANGE_SECS;
        if self.auth.refresh_ttl_secs < lo || self.auth.refresh_ttl_secs > hi {
            let clamped = self.auth.refresh_ttl_secs.clamp(lo, hi);
            tracing::warn!(
                configured = self.auth.refresh_ttl_secs,
                clamped,
                "refresh_ttl_secs outside 7-30 days; clamping"
            );
            self.auth.refresh_ttl_secs = clamped;
        }
    }
}

/// Workspace directory (`~/.authgate`), falling back to the current
/// directory when no home can be determined.
pub fn workspace_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".authgate"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default config file location (`~/.authgate/config.toml`).
pub fn default_config_path() -> PathBuf {
    workspace_dir().join("config.toml")
}

/// Generate a random 32-byte secret, hex-encoded.
fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ── Tests ───────────────────────────────────────────────────────────
