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

//! The install pipeline: classify targets, resolve the graph, preview,
//! confirm, then build and install layer by layer.

use comfy_table::Table;
use console::style;
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::aur::{AurSource, BuildCache, BuildOptions, PackageBuilder, RecipeFetcher, Resolver};
use crate::error::{AurvarkError, AurvarkResult};
use crate::pacman::{PacmanDatabase, SyncProvider};
use crate::package::{format_bytes, AurPackage, SyncPackage};

/// Knobs collected from the command line for one pipeline run
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Times `--nodeps` was given; once relaxes version checks, twice or
    /// more skips dependency checking entirely
    pub nodeps: u8,
    pub download_only: bool,
    pub no_confirm: bool,
}

impl InstallOptions {
    pub fn skip_verchecks(&self) -> bool {
        self.nodeps >= 1
    }

    pub fn skip_depchecks(&self) -> bool {
        self.nodeps >= 2
    }

    /// Flags forwarded verbatim into pacman transactions
    pub fn pacman_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        for _ in 0..self.nodeps {
            flags.push("--nodeps".to_string());
        }
        if self.download_only {
            flags.push("--downloadonly".to_string());
        }
        if self.no_confirm {
            flags.push("--noconfirm".to_string());
        }
        flags
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            skip_depchecks: self.skip_depchecks(),
        }
    }
}

/// Mutating package transactions, split out from the read-only provider
/// so the pipeline can run against a recording fake.
pub trait TransactionRunner {
    fn install_repo(
        &self,
        names: &[String],
        extra_flags: &[String],
        as_deps: bool,
    ) -> AurvarkResult<()>;

    fn install_files(
        &self,
        files: &[PathBuf],
        extra_flags: &[String],
        as_deps: bool,
    ) -> AurvarkResult<()>;
}

impl TransactionRunner for PacmanDatabase {
    fn install_repo(
        &self,
        names: &[String],
        extra_flags: &[String],
        as_deps: bool,
    ) -> AurvarkResult<()> {
        PacmanDatabase::install_repo(self, names, extra_flags, as_deps)
    }

    fn install_files(
        &self,
        files: &[PathBuf],
        extra_flags: &[String],
        as_deps: bool,
    ) -> AurvarkResult<()> {
        PacmanDatabase::install_files(self, files, extra_flags, as_deps)
    }
}

/// Everything one confirmed run will touch, computed up front
#[derive(Debug, Default)]
pub struct InstallationPlan {
    pub sync_explicit: Vec<SyncPackage>,
    pub aur_explicit: Vec<AurPackage>,
    pub sync_dependencies: Vec<SyncPackage>,
    pub aur_dependencies: Vec<AurPackage>,
    /// Deepest dependencies first; each layer is fully built and
    /// installed before the next starts
    pub build_layers: Vec<Vec<AurPackage>>,
}

impl InstallationPlan {
    pub fn is_empty(&self) -> bool {
        self.sync_explicit.is_empty()
            && self.build_layers.iter().all(Vec::is_empty)
            && self.sync_dependencies.is_empty()
    }

    fn packages_to_build(&self) -> Vec<AurPackage> {
        self.build_layers.iter().flatten().cloned().collect()
    }
}

/// Coordinates one install run over the two metadata providers.
pub struct Pipeline<'a, S: SyncProvider + ?Sized, A: AurSource + ?Sized> {
    sync: &'a S,
    aur: &'a A,
    cache: &'a BuildCache,
    fetch_concurrency: usize,
    options: InstallOptions,
}

impl<'a, S: SyncProvider + ?Sized, A: AurSource + ?Sized> Pipeline<'a, S, A> {
    pub fn new(
        sync: &'a S,
        aur: &'a A,
        cache: &'a BuildCache,
        fetch_concurrency: usize,
        options: InstallOptions,
    ) -> Self {
        Self {
            sync,
            aur,
            cache,
            fetch_concurrency,
            options,
        }
    }

    /// Classify explicit targets and resolve everything the run needs.
    ///
    /// No system mutation happens here; only metadata lookups.
    pub async fn plan(&self, targets: &[String]) -> AurvarkResult<InstallationPlan> {
        if targets.is_empty() {
            return Err(AurvarkError::MissingTargets);
        }

        let (sync_explicit, rest) = self.sync.get_by_names(targets)?;
        let (aur_explicit, missing) = self.aur.info(&rest).await?;
        if let Some(name) = missing.first() {
            return Err(AurvarkError::PackageNotFound {
                package: name.clone(),
            });
        }
        debug!(
            sync = sync_explicit.len(),
            aur = aur_explicit.len(),
            "classified explicit targets"
        );

        // dependency checking disabled entirely: build the explicit AUR
        // set as a single layer and resolve nothing
        if self.options.skip_depchecks() {
            let build_layers = if aur_explicit.is_empty() {
                vec![]
            } else {
                vec![aur_explicit.clone()]
            };
            return Ok(InstallationPlan {
                sync_explicit,
                aur_explicit,
                build_layers,
                ..Default::default()
            });
        }

        let resolver = Resolver::new(self.sync, self.aur);
        let graph = resolver.resolve(&aur_explicit, true).await?;

        let all_aur: Vec<AurPackage> = graph.nodes().cloned().collect();
        let sync_dependencies = resolver.sync_dependencies(&all_aur)?;
        let aur_dependencies =
            resolver.aur_dependencies(&graph, &aur_explicit, self.options.skip_verchecks());

        // only explicit packages and still-needed dependencies get built
        let build_set: HashSet<&str> = aur_explicit
            .iter()
            .chain(aur_dependencies.iter())
            .map(|p| p.name.as_str())
            .collect();
        let seeds: Vec<String> = aur_explicit.iter().map(|p| p.name.clone()).collect();
        let build_layers: Vec<Vec<AurPackage>> = graph
            .build_order(&seeds)
            .into_iter()
            .map(|layer| {
                layer
                    .into_iter()
                    .filter(|p| build_set.contains(p.name.as_str()))
                    .collect::<Vec<_>>()
            })
            .filter(|layer: &Vec<AurPackage>| !layer.is_empty())
            .collect();

        Ok(InstallationPlan {
            sync_explicit,
            aur_explicit,
            sync_dependencies,
            aur_dependencies,
            build_layers,
        })
    }

    /// Render the human-readable preview shown before confirmation
    pub fn preview(&self, plan: &InstallationPlan) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Package", "Version", "Source"]);

        for pkg in &plan.sync_explicit {
            table.add_row(vec![
                pkg.name.clone(),
                pkg.version.clone(),
                pkg.repo.clone(),
            ]);
        }
        for pkg in &plan.aur_explicit {
            table.add_row(vec![pkg.name.clone(), pkg.version.clone(), "aur".to_string()]);
        }
        for pkg in &plan.sync_dependencies {
            table.add_row(vec![
                pkg.name.clone(),
                pkg.version.clone(),
                format!("{} (dependency)", pkg.repo),
            ]);
        }
        for pkg in &plan.aur_dependencies {
            table.add_row(vec![
                pkg.name.clone(),
                pkg.version.clone(),
                "aur (dependency)".to_string(),
            ]);
        }

        let download: u64 = plan
            .sync_explicit
            .iter()
            .chain(&plan.sync_dependencies)
            .map(|p| p.download_size)
            .sum();
        let installed: u64 = plan
            .sync_explicit
            .iter()
            .chain(&plan.sync_dependencies)
            .map(|p| p.installed_size)
            .sum();
        let builds: usize = plan.build_layers.iter().map(Vec::len).sum();

        format!(
            "{}\n\n{} to download, {} installed, {} package(s) to build in {} layer(s)\n",
            table,
            format_bytes(download),
            format_bytes(installed),
            builds,
            plan.build_layers.len()
        )
    }

    /// Run the confirmed plan to completion.
    ///
    /// Sync dependencies install first in one batch, then each build
    /// layer is built and installed strictly in order; a build failure
    /// halts everything before any dependent is attempted. Explicit sync
    /// targets install last.
    pub async fn execute<F, B, R>(
        &self,
        plan: &InstallationPlan,
        fetcher: &F,
        builder: &B,
        runner: &R,
    ) -> AurvarkResult<()>
    where
        F: RecipeFetcher + ?Sized,
        B: PackageBuilder + ?Sized,
        R: TransactionRunner + ?Sized,
    {
        let flags = self.options.pacman_flags();

        let sync_dep_names: Vec<String> = plan
            .sync_dependencies
            .iter()
            .map(|p| p.name.clone())
            .collect();
        if !sync_dep_names.is_empty() {
            info!(count = sync_dep_names.len(), "installing sync dependencies");
            runner.install_repo(&sync_dep_names, &flags, true)?;
        }

        let to_build = plan.packages_to_build();
        if !to_build.is_empty() {
            let failures = self
                .cache
                .ensure_recipes(fetcher, &to_build, self.fetch_concurrency)
                .await;
            // a package without a recipe cannot be built, and skipping it
            // would break every dependent layer
            if let Some((_name, err)) = failures.into_iter().next() {
                return Err(err);
            }
        }

        let explicit_names: HashSet<&str> = plan
            .aur_explicit
            .iter()
            .map(|p| p.name.as_str())
            .collect();

        for layer in &plan.build_layers {
            let mut explicit_artifacts: Vec<PathBuf> = Vec::new();
            let mut dep_artifacts: Vec<PathBuf> = Vec::new();

            for pkg in layer {
                let recipe_dir = self.cache.entry_dir(&pkg.name);
                let artifacts =
                    builder.build(pkg, &recipe_dir, &self.options.build_options())?;
                if explicit_names.contains(pkg.name.as_str()) {
                    explicit_artifacts.extend(artifacts);
                } else {
                    dep_artifacts.extend(artifacts);
                }
            }

            // builds still run under --downloadonly, the artifacts just
            // stay in the cache
            if self.options.download_only {
                debug!("download-only run, leaving built artifacts uninstalled");
                continue;
            }

            // one batched transaction per layer, dependencies marked as such
            runner.install_files(&dep_artifacts, &flags, true)?;
            runner.install_files(&explicit_artifacts, &flags, false)?;
        }

        let sync_names: Vec<String> = plan
            .sync_explicit
            .iter()
            .map(|p| p.name.clone())
            .collect();
        if !sync_names.is_empty() {
            runner.install_repo(&sync_names, &flags, false)?;
        }

        Ok(())
    }
}

/// Yes/no prompt on stdout, default yes
pub fn confirm(prompt: &str) -> AurvarkResult<bool> {
    print!("{} {} [Y/n] ", style("::").green().bold(), prompt);
    std::io::stdout()
        .flush()
        .map_err(|e| AurvarkError::Other(format!("cannot write prompt: {}", e)))?;

    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .map_err(|e| AurvarkError::Other(format!("cannot read answer: {}", e)))?;

    let answer = answer.trim().to_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aur::resolver::tests::{aur_pkg, sync_pkg, FakeAur, FakeSync};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fetcher that materializes an empty recipe directory
    struct OkFetcher;

    #[async_trait]
    impl RecipeFetcher for OkFetcher {
        async fn fetch(&self, _pkg: &AurPackage, dest: &Path) -> AurvarkResult<()> {
            std::fs::create_dir_all(dest).unwrap();
            Ok(())
        }
    }

    /// Builder that records the build order and can fail on one name
    #[derive(Default)]
    struct FakeBuilder {
        built: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl PackageBuilder for FakeBuilder {
        fn build(
            &self,
            pkg: &AurPackage,
            _recipe_dir: &Path,
            _options: &BuildOptions,
        ) -> AurvarkResult<Vec<PathBuf>> {
            if self.fail_on.as_deref() == Some(pkg.name.as_str()) {
                return Err(AurvarkError::BuildFailed {
                    package: pkg.name.clone(),
                    exit_code: Some(4),
                    detail: "simulated".to_string(),
                });
            }
            self.built.lock().unwrap().push(pkg.name.clone());
            Ok(vec![PathBuf::from(format!(
                "{}-x86_64.pkg.tar.zst",
                pkg.name
            ))])
        }
    }

    /// Runner recording every transaction instead of touching the system
    #[derive(Default)]
    struct FakeRunner {
        repo_installs: Mutex<Vec<(Vec<String>, bool)>>,
        file_installs: Mutex<Vec<(Vec<PathBuf>, bool)>>,
        flags_seen: Mutex<Vec<Vec<String>>>,
    }

    impl TransactionRunner for FakeRunner {
        fn install_repo(
            &self,
            names: &[String],
            extra_flags: &[String],
            as_deps: bool,
        ) -> AurvarkResult<()> {
            self.repo_installs
                .lock()
                .unwrap()
                .push((names.to_vec(), as_deps));
            self.flags_seen.lock().unwrap().push(extra_flags.to_vec());
            Ok(())
        }

        fn install_files(
            &self,
            files: &[PathBuf],
            extra_flags: &[String],
            as_deps: bool,
        ) -> AurvarkResult<()> {
            if files.is_empty() {
                return Ok(());
            }
            self.file_installs
                .lock()
                .unwrap()
                .push((files.to_vec(), as_deps));
            self.flags_seen.lock().unwrap().push(extra_flags.to_vec());
            Ok(())
        }
    }

    fn chain_fixture() -> (FakeSync, FakeAur) {
        // foo -> bar -> baz, baz satisfied by sync
        let foo = aur_pkg("foo", "1.0-1", &["bar"]);
        let bar = aur_pkg("bar", "2.0-1", &["baz"]);
        let sync = FakeSync::with_repo(&[sync_pkg("extra", "baz", "3.0-1")]);
        let aur = FakeAur::with_packages(&[foo, bar]);
        (sync, aur)
    }

    #[tokio::test]
    async fn test_plan_classifies_and_layers() {
        let (sync, aur) = chain_fixture();
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path());
        let pipeline = Pipeline::new(&sync, &aur, &cache, 3, InstallOptions::default());

        let plan = pipeline.plan(&["foo".to_string()]).await.unwrap();

        assert!(plan.sync_explicit.is_empty());
        assert_eq!(plan.aur_explicit.len(), 1);
        let sync_dep_names: Vec<&str> = plan
            .sync_dependencies
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(sync_dep_names, vec!["baz"]);
        let layer_names: Vec<Vec<&str>> = plan
            .build_layers
            .iter()
            .map(|l| l.iter().map(|p| p.name.as_str()).collect())
            .collect();
        assert_eq!(layer_names, vec![vec!["bar"], vec!["foo"]]);
    }

    #[tokio::test]
    async fn test_plan_rejects_empty_targets() {
        let (sync, aur) = chain_fixture();
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path());
        let pipeline = Pipeline::new(&sync, &aur, &cache, 3, InstallOptions::default());

        assert!(matches!(
            pipeline.plan(&[]).await,
            Err(AurvarkError::MissingTargets)
        ));
    }

    #[tokio::test]
    async fn test_plan_unknown_target_is_fatal() {
        let (sync, aur) = chain_fixture();
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path());
        let pipeline = Pipeline::new(&sync, &aur, &cache, 3, InstallOptions::default());

        let result = pipeline.plan(&["no-such-package".to_string()]).await;
        assert!(matches!(
            result,
            Err(AurvarkError::PackageNotFound { package }) if package == "no-such-package"
        ));
    }

    #[tokio::test]
    async fn test_plan_skip_depchecks_resolves_nothing() {
        let (sync, aur) = chain_fixture();
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path());
        let options = InstallOptions {
            nodeps: 2,
            ..Default::default()
        };
        let pipeline = Pipeline::new(&sync, &aur, &cache, 3, options);

        let plan = pipeline.plan(&["foo".to_string()]).await.unwrap();

        assert!(plan.sync_dependencies.is_empty());
        assert!(plan.aur_dependencies.is_empty());
        assert_eq!(plan.build_layers.len(), 1);
        // only the classification lookup, no recursive discovery
        assert_eq!(
            aur.info_calls.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_execute_chain_end_to_end() {
        let (sync, aur) = chain_fixture();
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path());
        let pipeline = Pipeline::new(&sync, &aur, &cache, 3, InstallOptions::default());
        let plan = pipeline.plan(&["foo".to_string()]).await.unwrap();

        let builder = FakeBuilder::default();
        let runner = FakeRunner::default();
        pipeline
            .execute(&plan, &OkFetcher, &builder, &runner)
            .await
            .unwrap();

        // baz installs from the sync repos before any build
        let repo = runner.repo_installs.lock().unwrap();
        assert_eq!(repo.len(), 1);
        assert_eq!(repo[0].0, vec!["baz".to_string()]);
        assert!(repo[0].1, "sync dependencies install as deps");

        // bar built and installed strictly before foo
        assert_eq!(*builder.built.lock().unwrap(), vec!["bar", "foo"]);
        let files = runner.file_installs.lock().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].1, "dependency layer installs as deps");
        assert!(!files[1].1, "explicit layer installs explicitly");
    }

    #[tokio::test]
    async fn test_build_failure_halts_pipeline() {
        let (sync, aur) = chain_fixture();
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path());
        let pipeline = Pipeline::new(&sync, &aur, &cache, 3, InstallOptions::default());
        let plan = pipeline.plan(&["foo".to_string()]).await.unwrap();

        let builder = FakeBuilder {
            built: Mutex::new(vec![]),
            fail_on: Some("bar".to_string()),
        };
        let runner = FakeRunner::default();
        let result = pipeline.execute(&plan, &OkFetcher, &builder, &runner).await;

        assert!(matches!(
            result,
            Err(AurvarkError::BuildFailed { ref package, .. }) if package == "bar"
        ));
        // foo's build was never attempted, nothing from the layer installed
        assert!(builder.built.lock().unwrap().is_empty());
        assert!(runner.file_installs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_only_builds_but_never_installs() {
        let (sync, aur) = chain_fixture();
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(dir.path());
        let options = InstallOptions {
            download_only: true,
            ..Default::default()
        };
        let pipeline = Pipeline::new(&sync, &aur, &cache, 3, options);
        let plan = pipeline.plan(&["foo".to_string()]).await.unwrap();

        let builder = FakeBuilder::default();
        let runner = FakeRunner::default();
        pipeline
            .execute(&plan, &OkFetcher, &builder, &runner)
            .await
            .unwrap();

        // builds ran, no built archive was handed to pacman
        assert_eq!(*builder.built.lock().unwrap(), vec!["bar", "foo"]);
        assert!(runner.file_installs.lock().unwrap().is_empty());
        assert!(cache.entry_dir("foo").exists());
        // repo transactions carry the flag so pacman only downloads
        let flags = runner.flags_seen.lock().unwrap();
        assert!(flags.iter().all(|f| f.contains(&"--downloadonly".to_string())));
    }

    #[test]
    fn test_nodeps_semantics() {
        let once = InstallOptions {
            nodeps: 1,
            ..Default::default()
        };
        assert!(once.skip_verchecks());
        assert!(!once.skip_depchecks());

        let twice = InstallOptions {
            nodeps: 2,
            ..Default::default()
        };
        assert!(twice.skip_verchecks());
        assert!(twice.skip_depchecks());
        assert_eq!(twice.pacman_flags(), vec!["--nodeps", "--nodeps"]);
    }
}
