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

//! AUR (Arch User Repository) support module.
//!
//! - RPC client with batched info lookups
//! - Dependency graph discovery and build-order layering
//! - On-disk build cache with version-marker freshness
//! - makepkg orchestration with batched installs

pub mod builder;
pub mod cache;
pub mod client;
pub mod resolver;

pub use builder::{BuildOptions, Makepkg, PackageBuilder};
pub use cache::{BuildCache, GitFetcher, RecipeFetcher};
pub use client::{AurClient, AurSource};
pub use resolver::{DependencyGraph, Resolver};

use serde::Deserialize;

/// AUR RPC API response wrapper, shared by search and info requests
#[derive(Debug, Clone, Deserialize)]
pub struct AurRpcResponse<T> {
    pub version: u32,
    #[serde(rename = "type")]
    pub response_type: String,
    pub resultcount: usize,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    pub error: Option<String>,
}
