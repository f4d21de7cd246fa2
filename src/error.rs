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

//! Error types for every failure class the pipeline distinguishes.

use thiserror::Error;

/// Main error type for aurvark operations
#[derive(Debug, Error)]
pub enum AurvarkError {
    /// Malformed or unreadable configuration, fatal at startup
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Remote AUR metadata unreachable or malformed, fatal to the calling
    /// search/resolve operation
    #[error("Metadata fetch failed for {context}: {message}")]
    MetadataFetch {
        context: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Local package database produced output we could not parse
    #[error("Database error: {context}")]
    DatabaseParse { context: String },

    /// Cloning or refreshing a build recipe failed
    #[error("Failed to fetch build recipe for '{package}': {reason}")]
    RecipeFetch { package: String, reason: String },

    /// makepkg exited non-zero, fatal to the whole pipeline
    #[error("Build failed for '{package}': {detail}; manual intervention required")]
    BuildFailed {
        package: String,
        exit_code: Option<i32>,
        detail: String,
    },

    /// pacman exited non-zero during an install transaction
    #[error("Install transaction failed (pacman exit status {exit_code:?})")]
    InstallFailed { exit_code: Option<i32> },

    /// Package not found in the sync databases or the AUR
    #[error("Package '{package}' not found in the sync databases or the AUR")]
    PackageNotFound { package: String },

    /// An operation requiring targets received none
    #[error("no targets specified (use -h for help)")]
    MissingTargets,

    /// Two mutually exclusive flags present, reported before any I/O
    #[error("invalid option: '{first}' and '{second}' may not be used together")]
    ConflictingOptions { first: String, second: String },

    /// Generic wrapped error
    #[error("{0}")]
    Other(String),
}

impl AurvarkError {
    /// Create a metadata fetch error from a reqwest failure
    pub fn metadata(context: impl Into<String>, source: reqwest::Error) -> Self {
        AurvarkError::MetadataFetch {
            context: context.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a metadata fetch error with a plain message
    pub fn metadata_msg(context: impl Into<String>, message: impl Into<String>) -> Self {
        AurvarkError::MetadataFetch {
            context: context.into(),
            message: message.into(),
            source: None,
        }
    }
}

/// Result type alias for aurvark operations
pub type AurvarkResult<T> = std::result::Result<T, AurvarkError>;
