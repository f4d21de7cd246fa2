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

//! AUR dependency graph discovery and build-order layering.
//!
//! The graph holds AUR packages only; names satisfiable by the sync
//! databases are resolved as leaves and never become nodes. Discovery is
//! breadth-first with one batched info request per layer, so the number
//! of network round-trips is bounded by the depth of the dependency
//! chain, not the number of packages.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::AurvarkResult;
use crate::package::{AurPackage, DependencyKind, SyncPackage};
use crate::pacman::SyncProvider;

use super::client::AurSource;

/// A directed dependency edge, labeled with the list it was discovered
/// under. Optional dependencies never produce edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub to: String,
    pub kind: DependencyKind,
}

/// Directed graph over AUR packages, stored as an adjacency map.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, AurPackage>,
    edges: HashMap<String, Vec<DependencyEdge>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, deduplicating by `(name, version)` identity.
    ///
    /// Re-adding the same build is a no-op; a second record under the
    /// same name with a different version keeps the first (one recipe
    /// directory per name).
    pub fn add_node(&mut self, pkg: AurPackage) -> bool {
        match self.nodes.get(&pkg.name) {
            Some(existing) => {
                if existing.version != pkg.version {
                    warn!(
                        package = %pkg.name,
                        kept = %existing.version,
                        dropped = %pkg.version,
                        "conflicting versions discovered for one name"
                    );
                }
                false
            }
            None => {
                self.nodes.insert(pkg.name.clone(), pkg);
                true
            }
        }
    }

    /// Add an edge between two present nodes; duplicates are dropped
    pub fn add_edge(&mut self, from: &str, to: &str, kind: DependencyKind) {
        if !kind.is_build_relevant() {
            return;
        }
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return;
        }
        let edges = self.edges.entry(from.to_string()).or_default();
        let edge = DependencyEdge {
            to: to.to_string(),
            kind,
        };
        if !edges.contains(&edge) {
            edges.push(edge);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&AurPackage> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AurPackage> {
        self.nodes.values()
    }

    /// Every edge as `(from, edge)` pairs
    pub fn edges(&self) -> impl Iterator<Item = (&str, &DependencyEdge)> {
        self.edges
            .iter()
            .flat_map(|(from, edges)| edges.iter().map(move |e| (from.as_str(), e)))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Union of two graphs, deduplicated by package identity
    pub fn merge(&mut self, other: DependencyGraph) {
        for pkg in other.nodes.into_values() {
            self.add_node(pkg);
        }
        for (from, edges) in other.edges {
            for edge in edges {
                self.add_edge(&from, &edge.to, edge.kind);
            }
        }
    }

    /// Breadth-first layers seeded at the given names.
    ///
    /// The visited set makes revisiting a present node a no-op, so an
    /// accidental cycle terminates instead of looping; its back-edges
    /// are simply not represented in the layering.
    pub fn bfs_layers(&self, seeds: &[String]) -> Vec<Vec<&AurPackage>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut frontier: Vec<&str> = Vec::new();
        for seed in seeds {
            if let Some(pkg) = self.nodes.get(seed) {
                if visited.insert(&pkg.name) {
                    frontier.push(&pkg.name);
                }
            }
        }

        let mut layers = Vec::new();
        while !frontier.is_empty() {
            frontier.sort_unstable();
            let mut next: Vec<&str> = Vec::new();
            for name in &frontier {
                if let Some(edges) = self.edges.get(*name) {
                    for edge in edges {
                        if self.nodes.contains_key(&edge.to) && visited.insert(&edge.to) {
                            next.push(&edge.to);
                        }
                    }
                }
            }
            layers.push(
                frontier
                    .iter()
                    .filter_map(|name| self.nodes.get(*name))
                    .collect(),
            );
            frontier = next;
        }
        layers
    }

    /// Build order: BFS layers from the explicit set, reversed, so leaf
    /// dependencies are built and installed before anything that needs
    /// them. Each layer must be fully built and installed before the
    /// next starts.
    pub fn build_order(&self, seeds: &[String]) -> Vec<Vec<AurPackage>> {
        let mut layers = self.bfs_layers(seeds);
        layers.reverse();
        layers
            .into_iter()
            .map(|layer| layer.into_iter().cloned().collect())
            .collect()
    }
}

/// Dependency discovery over the two package universes.
pub struct Resolver<'a, S: SyncProvider + ?Sized, A: AurSource + ?Sized> {
    sync: &'a S,
    aur: &'a A,
}

impl<'a, S: SyncProvider + ?Sized, A: AurSource + ?Sized> Resolver<'a, S, A> {
    pub fn new(sync: &'a S, aur: &'a A) -> Self {
        Self { sync, aur }
    }

    /// Discover the AUR dependency graph for the given full-form
    /// packages.
    ///
    /// Per frontier layer: one batched sync lookup classifies
    /// sync-satisfiable names as leaves, then one batched AUR info call
    /// upgrades the rest into graph nodes. With `recursive` false only
    /// the immediate dependencies are discovered.
    pub async fn resolve(
        &self,
        explicit: &[AurPackage],
        recursive: bool,
    ) -> AurvarkResult<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for pkg in explicit {
            graph.add_node(pkg.clone());
        }

        let mut frontier: Vec<AurPackage> = explicit.to_vec();
        while !frontier.is_empty() {
            // dep name -> the packages that want it, with the list each
            // occurrence was declared under
            let mut wanted: BTreeMap<String, Vec<(String, DependencyKind)>> = BTreeMap::new();
            for pkg in &frontier {
                for (kind, dep) in pkg.build_dependencies() {
                    wanted
                        .entry(dep.to_string())
                        .or_default()
                        .push((pkg.name.clone(), kind));
                }
            }

            let unknown: Vec<String> = wanted
                .keys()
                .filter(|name| !graph.contains(name))
                .cloned()
                .collect();

            let mut added: Vec<AurPackage> = Vec::new();
            if !unknown.is_empty() {
                let (_sync_found, non_sync) = self.sync.get_by_names(&unknown)?;
                if !non_sync.is_empty() {
                    let (aur_found, missing) = self.aur.info(&non_sync).await?;
                    if !missing.is_empty() {
                        debug!(
                            names = missing.join(", "),
                            "dependencies not found in sync databases or AUR (likely virtual)"
                        );
                    }
                    for pkg in aur_found {
                        if graph.add_node(pkg.clone()) {
                            added.push(pkg);
                        }
                    }
                }
            }

            // connect this frontier to every dependency that is a node,
            // including diamonds discovered in earlier layers
            for (dep_name, wanters) in &wanted {
                if graph.contains(dep_name) {
                    for (from, kind) in wanters {
                        graph.add_edge(from, dep_name, *kind);
                    }
                }
            }

            if !recursive {
                break;
            }
            frontier = added;
        }

        Ok(graph)
    }

    /// Names from the packages' dependency lists that the sync provider
    /// satisfies and that are not yet installed, for one batched repo
    /// install before any AUR build.
    pub fn sync_dependencies(&self, packages: &[AurPackage]) -> AurvarkResult<Vec<SyncPackage>> {
        let mut names: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for pkg in packages {
            for (_kind, dep) in pkg.build_dependencies() {
                if seen.insert(dep) && self.sync.installed_version(dep).is_none() {
                    names.push(dep.to_string());
                }
            }
        }
        let (found, _missing) = self.sync.get_by_names(&names)?;
        Ok(found)
    }

    /// Edge targets of the graph that still need a build: everything
    /// pulled in transitively, minus the explicit set, minus packages
    /// already satisfied on the system.
    pub fn aur_dependencies(
        &self,
        graph: &DependencyGraph,
        explicit: &[AurPackage],
        skip_verchecks: bool,
    ) -> Vec<AurPackage> {
        let explicit_names: HashSet<&str> = explicit.iter().map(|p| p.name.as_str()).collect();
        let mut out: Vec<AurPackage> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (_from, edge) in graph.edges() {
            if explicit_names.contains(edge.to.as_str()) || !seen.insert(edge.to.clone()) {
                continue;
            }
            if let Some(pkg) = graph.get(&edge.to) {
                if !self.already_satisfied(pkg, skip_verchecks) {
                    out.push(pkg.clone());
                }
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// A dependency is satisfied when it is installed and either the
    /// exact version matches or version checking has been disabled.
    pub fn already_satisfied(&self, pkg: &AurPackage, skip_verchecks: bool) -> bool {
        match self.sync.installed_version(&pkg.name) {
            Some(installed) => skip_verchecks || installed == pkg.version,
            None => false,
        }
    }
}
