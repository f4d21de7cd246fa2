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

//! On-disk build recipe cache, one directory per package name.
//!
//! Each entry carries a marker file recording the exact version string
//! the recipe was fetched for. Freshness is a plain string comparison:
//! any mismatch is stale, not just an older version.

use async_trait::async_trait;
use console::style;
use futures::stream::{self, StreamExt};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::process::Command;
use tracing::debug;

use crate::error::{AurvarkError, AurvarkResult};
use crate::package::AurPackage;

/// Marker file inside a cache entry recording the fetched version
const VERSION_MARKER: &str = ".aurvark-ver";

/// Fetches one package's build recipe into a destination directory.
#[async_trait]
pub trait RecipeFetcher: Send + Sync {
    async fn fetch(&self, pkg: &AurPackage, dest: &Path) -> AurvarkResult<()>;
}

/// Clones or refreshes the per-package repository from the AUR.
pub struct GitFetcher {
    base_url: String,
}

impl GitFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn clone_url(&self, name: &str) -> String {
        format!("{}/{}.git", self.base_url.trim_end_matches('/'), name)
    }
}

#[async_trait]
impl RecipeFetcher for GitFetcher {
    async fn fetch(&self, pkg: &AurPackage, dest: &Path) -> AurvarkResult<()> {
        // a stale checkout is cheaper to replace than to reconcile
        if dest.exists() {
            fs::remove_dir_all(dest).map_err(|e| AurvarkError::RecipeFetch {
                package: pkg.name.clone(),
                reason: format!("cannot clear stale entry: {}", e),
            })?;
        }

        let url = self.clone_url(&pkg.name);
        debug!(package = %pkg.name, url = %url, "cloning recipe");

        let output = Command::new("git")
            .arg("clone")
            .arg("--depth=1")
            .arg(&url)
            .arg(dest)
            .output()
            .await
            .map_err(|e| AurvarkError::RecipeFetch {
                package: pkg.name.clone(),
                reason: format!("failed to run git: {}", e),
            })?;

        if !output.status.success() {
            return Err(AurvarkError::RecipeFetch {
                package: pkg.name.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// The build cache directory tree.
pub struct BuildCache {
    root: PathBuf,
}

impl BuildCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one package's recipe and build output
    pub fn entry_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Version string the cached recipe was fetched for, if recorded
    pub fn recorded_version(&self, name: &str) -> Option<String> {
        let marker = self.entry_dir(name).join(VERSION_MARKER);
        fs::read_to_string(marker)
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Fresh iff the recorded version equals the package's current one
    pub fn is_fresh(&self, pkg: &AurPackage) -> bool {
        self.recorded_version(&pkg.name).as_deref() == Some(pkg.version.as_str())
    }

    /// Make sure the recipe for one package is present and current.
    ///
    /// Fresh entries cost zero fetches; a stale or missing entry costs
    /// exactly one, after which the marker matches the package version.
    pub async fn ensure_recipe<F: RecipeFetcher + ?Sized>(
        &self,
        fetcher: &F,
        pkg: &AurPackage,
        force: bool,
    ) -> AurvarkResult<()> {
        if !force && self.is_fresh(pkg) {
            debug!(package = %pkg.name, "recipe up to date, skipping fetch");
            return Ok(());
        }

        fs::create_dir_all(&self.root).map_err(|e| AurvarkError::RecipeFetch {
            package: pkg.name.clone(),
            reason: format!("cannot create cache directory: {}", e),
        })?;

        let dest = self.entry_dir(&pkg.name);
        fetcher.fetch(pkg, &dest).await?;

        fs::write(dest.join(VERSION_MARKER), &pkg.version).map_err(|e| {
            AurvarkError::RecipeFetch {
                package: pkg.name.clone(),
                reason: format!("cannot record version marker: {}", e),
            }
        })?;

        Ok(())
    }

    /// Fetch recipes for many packages with a bounded worker pool.
    ///
    /// Individual failures are reported back per package and do not
    /// abort the sibling fetches; a failed package will fail later at
    /// its own build step.
    pub async fn ensure_recipes<F: RecipeFetcher + ?Sized>(
        &self,
        fetcher: &F,
        packages: &[AurPackage],
        concurrency: usize,
    ) -> Vec<(String, AurvarkError)> {
        let total = packages.len();
        let done = AtomicUsize::new(0);

        let results: Vec<Option<(String, AurvarkError)>> = stream::iter(packages)
            .map(|pkg| {
                let done = &done;
                async move {
                    let result = self.ensure_recipe(fetcher, pkg, false).await;
                    let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                    match result {
                        Ok(()) => {
                            println!(
                                "{} ({}/{}) recipe ready: {}",
                                style("::").cyan().bold(),
                                n,
                                total,
                                style(&pkg.name).white()
                            );
                            None
                        }
                        Err(err) => {
                            println!(
                                "{} ({}/{}) recipe fetch failed: {}",
                                style("::").red().bold(),
                                n,
                                total,
                                style(&pkg.name).white()
                            );
                            Some((pkg.name.clone(), err))
                        }
                    }
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        results.into_iter().flatten().collect()
    }

    /// Remove every cache entry
    pub fn clean(&self) -> AurvarkResult<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(|e| AurvarkError::Other(format!(
                "cannot clean cache directory {}: {}",
                self.root.display(),
                e
            )))?;
        }
        Ok(())
    }

    /// Remove built package archives, keeping the recipes
    pub fn clean_artifacts(&self) -> AurvarkResult<()> {
        if !self.root.exists() {
            return Ok(());
        }
        let entries = fs::read_dir(&self.root).map_err(|e| {
            AurvarkError::Other(format!("cannot read cache directory: {}", e))
        })?;
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            for file in fs::read_dir(&dir).into_iter().flatten().flatten() {
                let path = file.path();
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if name.contains(".pkg.tar") {
                        let _ = fs::remove_file(&path);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aur::resolver::tests::aur_pkg;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Fetcher that only records how often it ran
    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl RecipeFetcher for CountingFetcher {
        async fn fetch(&self, pkg: &AurPackage, dest: &Path) -> AurvarkResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_for.as_deref() == Some(pkg.name.as_str()) {
                return Err(AurvarkError::RecipeFetch {
                    package: pkg.name.clone(),
                    reason: "simulated".to_string(),
                });
            }
            fs::create_dir_all(dest).unwrap();
            fs::write(dest.join("PKGBUILD"), "pkgname=test\n").unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_freshness_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path());
        let fetcher = CountingFetcher::default();
        let pkg = aur_pkg("widget", "1.0-1", &[]);

        // missing entry: exactly one fetch, marker recorded
        cache.ensure_recipe(&fetcher, &pkg, false).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.recorded_version("widget").as_deref(), Some("1.0-1"));

        // fresh entry: zero additional fetches
        cache.ensure_recipe(&fetcher, &pkg, false).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        // version bump: one fetch, marker updated to match
        let newer = aur_pkg("widget", "1.1-1", &[]);
        cache.ensure_recipe(&fetcher, &newer, false).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.recorded_version("widget").as_deref(), Some("1.1-1"));
    }

    #[tokio::test]
    async fn test_any_mismatch_is_stale() {
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path());
        let fetcher = CountingFetcher::default();

        // recorded version is *newer* than the requested one; still stale
        cache
            .ensure_recipe(&fetcher, &aur_pkg("widget", "2.0-1", &[]), false)
            .await
            .unwrap();
        cache
            .ensure_recipe(&fetcher, &aur_pkg("widget", "1.0-1", &[]), false)
            .await
            .unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_refetches_fresh_entry() {
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path());
        let fetcher = CountingFetcher::default();
        let pkg = aur_pkg("widget", "1.0-1", &[]);

        cache.ensure_recipe(&fetcher, &pkg, false).await.unwrap();
        cache.ensure_recipe(&fetcher, &pkg, true).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_does_not_abort_siblings() {
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path());
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
            fail_for: Some("bad".to_string()),
        };

        let packages = vec![
            aur_pkg("good", "1.0-1", &[]),
            aur_pkg("bad", "1.0-1", &[]),
            aur_pkg("also-good", "1.0-1", &[]),
        ];
        let failures = cache.ensure_recipes(&fetcher, &packages, 3).await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "bad");
        assert!(cache.is_fresh(&packages[0]));
        assert!(cache.is_fresh(&packages[2]));
        assert!(!cache.is_fresh(&packages[1]));
    }

    #[test]
    fn test_clone_url() {
        let fetcher = GitFetcher::new("https://aur.archlinux.org");
        assert_eq!(
            fetcher.clone_url("widget-git"),
            "https://aur.archlinux.org/widget-git.git"
        );
        // trailing slash tolerated
        let fetcher = GitFetcher::new("https://aur.archlinux.org/");
        assert_eq!(
            fetcher.clone_url("widget-git"),
            "https://aur.archlinux.org/widget-git.git"
        );
    }
}
