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

//! Sync database lookups and pacman process invocations.
//!
//! All queries go through a single pacman call per batch with `LC_ALL=C`
//! so the field labels are stable enough to parse.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::config::PacmanConfig;
use crate::error::{AurvarkError, AurvarkResult};
use crate::package::SyncPackage;

/// Read-only lookups against the local and sync package databases.
///
/// The resolver and pipeline take this as a seam so tests can substitute
/// an in-memory fake.
pub trait SyncProvider {
    /// Search the sync databases by keyword
    fn search(&self, query: &str) -> AurvarkResult<Vec<SyncPackage>>;

    /// Batched lookup by exact names; names with no sync record come back
    /// in the second list rather than as an error
    fn get_by_names(&self, names: &[String]) -> AurvarkResult<(Vec<SyncPackage>, Vec<String>)>;

    /// Installed version of a package, if any
    fn installed_version(&self, name: &str) -> Option<&str>;
}

/// Sync provider backed by the system pacman binary.
pub struct PacmanDatabase {
    paths: PacmanConfig,
    /// Snapshot of the local database, taken once at construction
    installed: HashMap<String, String>,
}

impl PacmanDatabase {
    pub fn new(paths: PacmanConfig) -> AurvarkResult<Self> {
        let output = pacman_query(&paths, &["-Q"])?;
        let installed = parse_installed_output(&output)?;
        debug!(count = installed.len(), "loaded local package snapshot");
        Ok(Self { paths, installed })
    }

    /// Install repository packages in one batched transaction
    pub fn install_repo(
        &self,
        names: &[String],
        extra_flags: &[String],
        as_deps: bool,
    ) -> AurvarkResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        let mut args: Vec<String> = vec!["--sync".to_string()];
        if as_deps {
            args.push("--asdeps".to_string());
        }
        args.extend(extra_flags.iter().cloned());
        args.extend(names.iter().cloned());
        run_pacman_transaction(&args)
    }

    /// Install already-built package archives in one batched transaction
    pub fn install_files(
        &self,
        paths: &[PathBuf],
        extra_flags: &[String],
        as_deps: bool,
    ) -> AurvarkResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args: Vec<String> = vec!["--upgrade".to_string()];
        if as_deps {
            args.push("--asdeps".to_string());
        }
        args.extend(extra_flags.iter().cloned());
        args.extend(paths.iter().map(|p| p.display().to_string()));
        run_pacman_transaction(&args)
    }

    /// Refresh the sync databases (`--refresh` repeated `count` times)
    pub fn refresh(&self, count: u8) -> AurvarkResult<()> {
        let mut args = vec!["--sync".to_string()];
        for _ in 0..count {
            args.push("--refresh".to_string());
        }
        run_pacman_transaction(&args)
    }

    /// Upgrade all system packages
    pub fn sysupgrade(&self) -> AurvarkResult<()> {
        run_pacman_transaction(&["--sync".to_string(), "--sysupgrade".to_string()])
    }

    /// Print native info output for sync packages (pass-through)
    pub fn print_info(&self, names: &[String]) -> AurvarkResult<()> {
        let mut args: Vec<String> = vec!["--sync".to_string(), "--info".to_string()];
        args.extend(names.iter().cloned());
        let status = Command::new("pacman")
            .args(&args)
            .status()
            .map_err(|e| AurvarkError::Other(format!("failed to run pacman: {}", e)))?;
        if !status.success() {
            return Err(AurvarkError::InstallFailed {
                exit_code: status.code(),
            });
        }
        Ok(())
    }
}

impl SyncProvider for PacmanDatabase {
    fn search(&self, query: &str) -> AurvarkResult<Vec<SyncPackage>> {
        // pacman -Ss exits 1 on no matches; that is an empty result, not
        // a failure
        let output = query_command(&self.paths)
            .args(["-Ss", query])
            .output()
            .map_err(|e| AurvarkError::Other(format!("failed to run pacman: {}", e)))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(vec![]);
        }
        let names = parse_search_names(&stdout)?;
        let (found, _missing) = self.get_by_names(&names)?;
        Ok(found)
    }

    fn get_by_names(&self, names: &[String]) -> AurvarkResult<(Vec<SyncPackage>, Vec<String>)> {
        if names.is_empty() {
            return Ok((vec![], vec![]));
        }
        // -Si exits non-zero when any name is unknown; unknown names are
        // reported as missing, parsed records are still returned
        let mut args: Vec<&str> = vec!["-Si"];
        args.extend(names.iter().map(|n| n.as_str()));
        let output = query_command(&self.paths)
            .args(&args)
            .output()
            .map_err(|e| AurvarkError::Other(format!("failed to run pacman: {}", e)))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let found = parse_info_output(&stdout)?;
        let missing = names
            .iter()
            .filter(|n| !found.iter().any(|p| &&p.name == n))
            .cloned()
            .collect();
        Ok((found, missing))
    }

    fn installed_version(&self, name: &str) -> Option<&str> {
        self.installed.get(name).map(|v| v.as_str())
    }
}

/// Read-only pacman invocation honoring the configured root and db path
fn query_command(paths: &PacmanConfig) -> Command {
    let mut cmd = Command::new("pacman");
    cmd.env("LC_ALL", "C")
        .arg("--root")
        .arg(&paths.root)
        .arg("--dbpath")
        .arg(&paths.db_path)
        .arg("--config")
        .arg(&paths.conf)
        .stderr(Stdio::null());
    cmd
}

fn pacman_query(paths: &PacmanConfig, args: &[&str]) -> AurvarkResult<String> {
    let output = query_command(paths)
        .args(args)
        .output()
        .map_err(|e| AurvarkError::Other(format!("failed to run pacman: {}", e)))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn run_pacman_transaction(args: &[String]) -> AurvarkResult<()> {
    let status = Command::new("sudo")
        .arg("pacman")
        .args(args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| AurvarkError::Other(format!("failed to run pacman: {}", e)))?;
    if !status.success() {
        return Err(AurvarkError::InstallFailed {
            exit_code: status.code(),
        });
    }
    Ok(())
}

/// Parse `pacman -Q` output into a name -> version map
fn parse_installed_output(output: &str) -> AurvarkResult<HashMap<String, String>> {
    let mut installed = HashMap::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(name), Some(version)) => {
                installed.insert(name.to_string(), version.to_string());
            }
            _ => {
                return Err(AurvarkError::DatabaseParse {
                    context: format!("unexpected local query line: '{}'", line),
                })
            }
        }
    }
    Ok(installed)
}

/// Extract package names from `pacman -Ss` output.
///
/// Entry headers look like `extra/ripgrep 14.1.0-1 [installed]`, followed
/// by an indented description line.
fn parse_search_names(output: &str) -> AurvarkResult<Vec<String>> {
    let mut names = Vec::new();
    for line in output.lines() {
        if line.starts_with(char::is_whitespace) || line.trim().is_empty() {
            continue;
        }
        let header = line.split_whitespace().next().unwrap_or_default();
        match header.split_once('/') {
            Some((_repo, name)) => names.push(name.to_string()),
            None => {
                return Err(AurvarkError::DatabaseParse {
                    context: format!("unexpected search header: '{}'", line),
                })
            }
        }
    }
    Ok(names)
}

/// Parse `pacman -Si` output blocks into sync packages
fn parse_info_output(output: &str) -> AurvarkResult<Vec<SyncPackage>> {
    let mut packages = Vec::new();
    for block in output.split("\n\n") {
        if block.trim().is_empty() {
            continue;
        }
        let mut fields: HashMap<&str, &str> = HashMap::new();
        for line in block.lines() {
            // field lines are `Label          : value`; wrapped
            // continuation lines have no ` : ` separator
            if let Some((key, value)) = line.split_once(" : ") {
                let key = key.trim();
                if matches!(
                    key,
                    "Repository" | "Name" | "Version" | "Description" | "Download Size"
                        | "Installed Size"
                ) {
                    fields.entry(key).or_insert(value.trim());
                }
            }
        }
        let name = fields.get("Name").ok_or_else(|| AurvarkError::DatabaseParse {
            context: "info block without a Name field".to_string(),
        })?;
        let version = fields
            .get("Version")
            .ok_or_else(|| AurvarkError::DatabaseParse {
                context: format!("info block for '{}' without a Version field", name),
            })?;
        packages.push(SyncPackage {
            repo: fields.get("Repository").unwrap_or(&"unknown").to_string(),
            name: name.to_string(),
            version: version.to_string(),
            description: fields.get("Description").unwrap_or(&"").to_string(),
            download_size: fields
                .get("Download Size")
                .map(|s| parse_size(s))
                .unwrap_or(0),
            installed_size: fields
                .get("Installed Size")
                .map(|s| parse_size(s))
                .unwrap_or(0),
        });
    }
    Ok(packages)
}

/// Convert a pacman size field (`6.50 KiB`) back to bytes
fn parse_size(field: &str) -> u64 {
    let mut parts = field.split_whitespace();
    let value: f64 = match parts.next().and_then(|v| v.parse().ok()) {
        Some(v) => v,
        None => return 0,
    };
    let multiplier = match parts.next() {
        Some("B") | None => 1.0,
        Some("KiB") => 1024.0,
        Some("MiB") => 1024.0 * 1024.0,
        Some("GiB") => 1024.0 * 1024.0 * 1024.0,
        Some("TiB") => 1024.0f64.powi(4),
        Some(_) => return 0,
    };
    (value * multiplier) as u64
}
