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

//! Typed package representations for the sync databases and the AUR.

use serde::Deserialize;
use std::hash::{Hash, Hasher};

/// Dependency classification, resolved once when the record is parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Needed only to run the test suite during build
    Check,
    /// Needed only to build
    Make,
    /// Needed at runtime
    Run,
    /// Suggested, never required and never a graph edge
    Optional,
}

impl DependencyKind {
    /// Map an AUR RPC info field name to a kind
    pub fn from_field(field: &str) -> Option<Self> {
        match field {
            "CheckDepends" => Some(DependencyKind::Check),
            "MakeDepends" => Some(DependencyKind::Make),
            "Depends" => Some(DependencyKind::Run),
            "OptDepends" => Some(DependencyKind::Optional),
            _ => None,
        }
    }

    /// Kinds that participate in build-order computation
    pub fn is_build_relevant(&self) -> bool {
        !matches!(self, DependencyKind::Optional)
    }
}

/// Strip a version constraint or description suffix from a dependency
/// string, leaving the bare package name.
///
/// Dependency entries come as `name`, `name>=1.2`, `name=1.2`, or
/// `name: why you might want it` (opt-depends form).
pub fn parse_dep_name(dep: &str) -> &str {
    let dep = dep.trim();
    for op in [">=", "<=", "=", ">", "<", ":"] {
        if let Some(pos) = dep.find(op) {
            return dep[..pos].trim();
        }
    }
    dep
}

/// Render a byte count as a human-readable size
pub fn format_bytes(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", size, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// A package backed by a prebuilt binary in a sync repository.
///
/// Built by parsing native database query output; lives for one process
/// invocation only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPackage {
    /// Repository section the record came from (core/extra/multilib/...)
    pub repo: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub download_size: u64,
    pub installed_size: u64,
}

/// Lightweight AUR record from a *search* response.
///
/// Dependency lists are absent; an instance must be upgraded via an info
/// lookup before it can participate in dependency resolution.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AurBasic {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub num_votes: u32,
    pub popularity: f64,
    pub out_of_date: Option<i64>,
    pub maintainer: Option<String>,
}

impl AurBasic {
    /// True when the package has no maintainer
    pub fn orphaned(&self) -> bool {
        self.maintainer.is_none()
    }
}

/// Full AUR record from an *info* response, with dependency lists
/// populated. This is the only form the resolver operates on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AurPackage {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub num_votes: u32,
    pub popularity: f64,
    pub out_of_date: Option<i64>,
    pub maintainer: Option<String>,

    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub make_depends: Vec<String>,
    #[serde(default)]
    pub check_depends: Vec<String>,
    #[serde(default)]
    pub opt_depends: Vec<String>,
}

impl AurPackage {
    /// True when the package has no maintainer
    pub fn orphaned(&self) -> bool {
        self.maintainer.is_none()
    }

    /// Out-of-date flag date, when the package has been flagged
    pub fn flag_date(&self) -> Option<chrono::NaiveDate> {
        self.out_of_date
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive())
    }

    /// Every build-relevant dependency name with its kind. Optional
    /// dependencies are recorded for display only and never appear here.
    pub fn build_dependencies(&self) -> impl Iterator<Item = (DependencyKind, &str)> {
        self.check_depends
            .iter()
            .map(|d| (DependencyKind::Check, parse_dep_name(d)))
            .chain(
                self.make_depends
                    .iter()
                    .map(|d| (DependencyKind::Make, parse_dep_name(d))),
            )
            .chain(
                self.depends
                    .iter()
                    .map(|d| (DependencyKind::Run, parse_dep_name(d))),
            )
    }
}

// Identity is (name, version): two records are the same build iff both match.
impl PartialEq for AurPackage {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for AurPackage {}

impl Hash for AurPackage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    pub(crate) fn aur_pkg(name: &str, version: &str, depends: &[&str]) -> AurPackage {
        AurPackage {
            name: name.to_string(),
            version: version.to_string(),
            description: None,
            num_votes: 0,
            popularity: 0.0,
            out_of_date: None,
            maintainer: Some("someone".to_string()),
            depends: depends.iter().map(|d| d.to_string()).collect(),
            make_depends: vec![],
            check_depends: vec![],
            opt_depends: vec![],
        }
    }

    #[test]
    fn test_parse_dep_name() {
        assert_eq!(parse_dep_name("gcc"), "gcc");
        assert_eq!(parse_dep_name("python>=3.10"), "python");
        assert_eq!(parse_dep_name("rust=1.70.0"), "rust");
        assert_eq!(parse_dep_name("glibc<3"), "glibc");
        assert_eq!(parse_dep_name("ffmpeg: for video previews"), "ffmpeg");
        assert_eq!(parse_dep_name("  libfoo  "), "libfoo");
    }

    #[test]
    fn test_dependency_kind_mapping() {
        assert_eq!(
            DependencyKind::from_field("CheckDepends"),
            Some(DependencyKind::Check)
        );
        assert_eq!(
            DependencyKind::from_field("MakeDepends"),
            Some(DependencyKind::Make)
        );
        assert_eq!(
            DependencyKind::from_field("Depends"),
            Some(DependencyKind::Run)
        );
        assert_eq!(
            DependencyKind::from_field("OptDepends"),
            Some(DependencyKind::Optional)
        );
        assert_eq!(DependencyKind::from_field("Conflicts"), None);

        assert!(DependencyKind::Make.is_build_relevant());
        assert!(!DependencyKind::Optional.is_build_relevant());
    }

    #[test]
    fn test_identity_by_name_and_version() {
        let a = aur_pkg("foo", "1.0-1", &["bar"]);
        let b = aur_pkg("foo", "1.0-1", &[]);
        let c = aur_pkg("foo", "1.1-1", &[]);

        // dependency lists do not affect identity
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_build_dependencies_exclude_optional() {
        let mut pkg = aur_pkg("foo", "1.0-1", &["run-dep>=2"]);
        pkg.make_depends = vec!["make-dep".to_string()];
        pkg.check_depends = vec!["check-dep".to_string()];
        pkg.opt_depends = vec!["opt-dep: shiny extras".to_string()];

        let deps: Vec<(DependencyKind, &str)> = pkg.build_dependencies().collect();
        assert_eq!(
            deps,
            vec![
                (DependencyKind::Check, "check-dep"),
                (DependencyKind::Make, "make-dep"),
                (DependencyKind::Run, "run-dep"),
            ]
        );
    }

    #[test]
    fn test_orphaned_from_missing_maintainer() {
        let mut pkg = aur_pkg("foo", "1.0-1", &[]);
        assert!(!pkg.orphaned());
        pkg.maintainer = None;
        assert!(pkg.orphaned());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_deserialize_info_record() {
        let raw = r#"{
            "Name": "widget-git",
            "Version": "1.2.r3-1",
            "Description": "A widget",
            "NumVotes": 42,
            "Popularity": 1.5,
            "OutOfDate": null,
            "Maintainer": null,
            "Depends": ["glibc"],
            "MakeDepends": ["git"]
        }"#;
        let pkg: AurPackage = serde_json::from_str(raw).unwrap();
        assert_eq!(pkg.name, "widget-git");
        assert!(pkg.orphaned());
        assert_eq!(pkg.depends, vec!["glibc"]);
        assert_eq!(pkg.make_depends, vec!["git"]);
        assert!(pkg.check_depends.is_empty());
    }
}
