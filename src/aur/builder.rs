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

//! makepkg orchestration for cached build recipes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{AurvarkError, AurvarkResult};
use crate::package::AurPackage;

/// Knobs forwarded from the command line into each makepkg run
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Let makepkg skip its own dependency verification
    pub skip_depchecks: bool,
}

impl BuildOptions {
    /// Single combined makepkg flag argument.
    ///
    /// Always force a rebuild (`f`), install missing build deps (`s`),
    /// and clean the work tree afterwards (`c`).
    pub fn makepkg_flags(&self) -> String {
        let mut flags = String::from("-fsc");
        if self.skip_depchecks {
            flags.push('d');
        }
        flags
    }
}

/// Builds one package from its recipe directory.
///
/// Implementations run inside a layer loop that is strictly sequential;
/// a failure must surface immediately so dependents are never attempted.
pub trait PackageBuilder {
    fn build(
        &self,
        pkg: &AurPackage,
        recipe_dir: &Path,
        options: &BuildOptions,
    ) -> AurvarkResult<Vec<PathBuf>>;
}

/// The real builder, shelling out to makepkg.
pub struct Makepkg;

impl PackageBuilder for Makepkg {
    fn build(
        &self,
        pkg: &AurPackage,
        recipe_dir: &Path,
        options: &BuildOptions,
    ) -> AurvarkResult<Vec<PathBuf>> {
        info!(package = %pkg.name, dir = %recipe_dir.display(), "building");

        // working directory is set explicitly, the process cwd never moves
        let status = Command::new("makepkg")
            .arg(options.makepkg_flags())
            .arg("--noconfirm")
            .current_dir(recipe_dir)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| AurvarkError::BuildFailed {
                package: pkg.name.clone(),
                exit_code: None,
                detail: format!("failed to run makepkg: {}", e),
            })?;

        if !status.success() {
            return Err(AurvarkError::BuildFailed {
                package: pkg.name.clone(),
                exit_code: status.code(),
                detail: "makepkg reported failure".to_string(),
            });
        }

        let artifacts = find_artifacts(recipe_dir, &pkg.name)?;
        if artifacts.is_empty() {
            return Err(AurvarkError::BuildFailed {
                package: pkg.name.clone(),
                exit_code: None,
                detail: "build succeeded but produced no package archive".to_string(),
            });
        }
        debug!(package = %pkg.name, count = artifacts.len(), "build artifacts found");
        Ok(artifacts)
    }
}

/// Locate built package archives (`{name}-*.pkg.tar*`) in a recipe
/// directory, sorted by file name for stable install ordering.
pub fn find_artifacts(dir: &Path, name: &str) -> AurvarkResult<Vec<PathBuf>> {
    let prefix = format!("{}-", name);
    let entries = fs::read_dir(dir).map_err(|e| AurvarkError::Other(format!(
        "cannot scan build directory {}: {}",
        dir.display(),
        e
    )))?;

    let mut artifacts: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&prefix) && n.contains(".pkg.tar"))
                .unwrap_or(false)
        })
        .collect();
    artifacts.sort();
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_makepkg_flags() {
        assert_eq!(BuildOptions::default().makepkg_flags(), "-fsc");
        let options = BuildOptions {
            skip_depchecks: true,
        };
        assert_eq!(options.makepkg_flags(), "-fscd");
    }

    #[test]
    fn test_find_artifacts_matches_own_archives_only() {
        let dir = TempDir::new().unwrap();
        let touch = |name: &str| fs::write(dir.path().join(name), b"").unwrap();

        touch("widget-1.0-1-x86_64.pkg.tar.zst");
        touch("widget-debug-1.0-1-x86_64.pkg.tar.zst");
        touch("other-2.0-1-x86_64.pkg.tar.zst");
        touch("PKGBUILD");
        touch("widget-1.0.tar.gz");

        let artifacts = find_artifacts(dir.path(), "widget").unwrap();
        let names: Vec<&str> = artifacts
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "widget-1.0-1-x86_64.pkg.tar.zst",
                "widget-debug-1.0-1-x86_64.pkg.tar.zst",
            ]
        );
    }

    #[test]
    fn test_find_artifacts_missing_dir_is_an_error() {
        assert!(find_artifacts(Path::new("/nonexistent/place"), "widget").is_err());
    }
}
