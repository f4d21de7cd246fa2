/*
 * aurvark - AUR install assistant for Arch Linux.
 * Copyright (C) 2025  aurvark contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Configuration management with validation and defaults.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AurvarkError, AurvarkResult};

/// Main configuration structure for aurvark
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// AUR-specific configuration
    pub aur: AurConfig,

    /// Native package manager paths
    pub pacman: PacmanConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            aur: AurConfig::default(),
            pacman: PacmanConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// AUR-specific configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AurConfig {
    /// AUR RPC base URL
    pub rpc_url: String,

    /// Base URL for per-package recipe repositories
    pub recipe_url: String,

    /// Build cache directory, one subdirectory per package
    pub cache_dir: PathBuf,

    /// Concurrent recipe fetches
    pub fetch_concurrency: usize,

    /// AUR metadata cache size (number of entries)
    pub info_cache_size: usize,
}

impl Default for AurConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("aurvark");
        Self {
            rpc_url: "https://aur.archlinux.org/rpc/".to_string(),
            recipe_url: "https://aur.archlinux.org".to_string(),
            cache_dir,
            fetch_concurrency: 3,
            info_cache_size: 500,
        }
    }
}

/// Native package manager paths
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacmanConfig {
    /// Installation root
    pub root: PathBuf,

    /// Local/sync database path
    pub db_path: PathBuf,

    /// pacman configuration file
    pub conf: PathBuf,
}

impl Default for PacmanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            db_path: PathBuf::from("/var/lib/pacman"),
            conf: PathBuf::from("/etc/pacman.conf"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with precedence:
    /// 1. /etc/aurvark.toml (system-wide)
    /// 2. ~/.config/aurvark/config.toml (user)
    /// 3. Environment variables (AURVARK_*)
    pub fn load() -> AurvarkResult<Self> {
        let mut config = Config::default();

        let system_config = Path::new("/etc/aurvark.toml");
        if system_config.exists() {
            config = Self::read_file(system_config)?;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("aurvark").join("config.toml");
            if user_config.exists() {
                config = Self::read_file(&user_config)?;
            }
        }

        config = config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn read_file(path: &Path) -> AurvarkResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| AurvarkError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        toml::from_str(&content).map_err(|e| AurvarkError::Config {
            message: format!("cannot parse {}: {}", path.display(), e),
        })
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("AURVARK_RPC_URL") {
            self.aur.rpc_url = val;
        }
        if let Ok(val) = std::env::var("AURVARK_CACHE_DIR") {
            self.aur.cache_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("AURVARK_LOG_LEVEL") {
            self.logging.level = val;
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> AurvarkResult<()> {
        if self.aur.fetch_concurrency == 0 {
            return Err(AurvarkError::Config {
                message: "aur.fetch_concurrency must be at least 1".to_string(),
            });
        }
        if self.aur.fetch_concurrency > 16 {
            return Err(AurvarkError::Config {
                message: "aur.fetch_concurrency must be at most 16".to_string(),
            });
        }
        if self.aur.rpc_url.is_empty() {
            return Err(AurvarkError::Config {
                message: "aur.rpc_url must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
