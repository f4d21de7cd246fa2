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

//! Merged search results, ranking, and numeric selection parsing.
//!
//! Results are printed lowest-priority first so the best matches sit
//! next to the prompt, and numbered from the end: index 1 is the last
//! line printed.

use console::style;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::package::{AurBasic, SyncPackage};

/// One merged search hit from either source
#[derive(Debug, Clone)]
pub enum SearchEntry {
    Sync(SyncPackage),
    Aur(AurBasic),
}

impl SearchEntry {
    pub fn name(&self) -> &str {
        match self {
            SearchEntry::Sync(p) => &p.name,
            SearchEntry::Aur(p) => &p.name,
        }
    }

    pub fn version(&self) -> &str {
        match self {
            SearchEntry::Sync(p) => &p.version,
            SearchEntry::Aur(p) => &p.version,
        }
    }

    pub fn repo(&self) -> &str {
        match self {
            SearchEntry::Sync(p) => &p.repo,
            SearchEntry::Aur(_) => "aur",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            SearchEntry::Sync(p) => &p.description,
            SearchEntry::Aur(p) => p.description.as_deref().unwrap_or(""),
        }
    }

    /// Fixed repository ordering, lower is better
    fn priority(&self) -> u8 {
        match self {
            SearchEntry::Sync(p) => match p.repo.as_str() {
                "core" => 0,
                "extra" => 1,
                "community" => 2,
                "multilib" => 3,
                _ => 4,
            },
            SearchEntry::Aur(_) => 5,
        }
    }
}

/// A ranked result list with 1-based-from-the-end numbering.
///
/// Entries are stored in display order (worst first); index 1 names the
/// last entry.
pub struct SearchResults {
    entries: Vec<SearchEntry>,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by its displayed number
    pub fn get(&self, index: usize) -> Option<&SearchEntry> {
        if index == 0 || index > self.entries.len() {
            return None;
        }
        self.entries.get(self.entries.len() - index)
    }

    /// Resolve a parsed selection into concrete entries
    pub fn select(&self, indices: &BTreeSet<usize>) -> Vec<SearchEntry> {
        indices
            .iter()
            .filter_map(|&i| self.get(i).cloned())
            .collect()
    }

    /// Render the numbered list, annotating installed versions via the
    /// supplied lookup
    pub fn render<'a, F>(&self, installed: F) -> String
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let total = self.entries.len();
        let mut out = String::new();
        for (pos, entry) in self.entries.iter().enumerate() {
            let number = total - pos;
            out.push_str(&format!(
                "{} {}/{} {}",
                style(number).magenta(),
                style(entry.repo()).cyan(),
                style(entry.name()).white().bold(),
                style(entry.version()).green()
            ));
            if installed(entry.name()).is_some() {
                out.push_str(&format!(" {}", style("[installed]").cyan().bold()));
            }
            if let SearchEntry::Aur(pkg) = entry {
                out.push_str(&format!(" (+{} {:.2})", pkg.num_votes, pkg.popularity));
                if pkg.orphaned() {
                    out.push_str(&format!(" {}", style("(Orphaned)").red().bold()));
                }
                if pkg.out_of_date.is_some() {
                    out.push_str(&format!(" {}", style("(Out-of-date)").red().bold()));
                }
            }
            out.push_str(&format!("\n    {}\n", entry.description()));
        }
        out
    }
}

/// Merge and rank the two result sets for one query.
///
/// Sorted worst-priority first, then any exact name match is moved to
/// the very end regardless of source so it lands at index 1.
pub fn rank(query: &str, sync: Vec<SyncPackage>, aur: Vec<AurBasic>) -> SearchResults {
    let mut entries: Vec<SearchEntry> = sync
        .into_iter()
        .map(SearchEntry::Sync)
        .chain(aur.into_iter().map(SearchEntry::Aur))
        .collect();

    entries.sort_by_key(|e| std::cmp::Reverse(e.priority()));

    let (exact, mut rest): (Vec<SearchEntry>, Vec<SearchEntry>) =
        entries.into_iter().partition(|e| e.name() == query);
    rest.extend(exact);

    SearchResults { entries: rest }
}

fn selection_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\^?\d+(?:-\d+)?").unwrap())
}

/// Parse an interactive selection string into a set of result numbers.
///
/// Tokens are a bare number, an inclusive range `a-b`, or either form
/// prefixed with `^` to exclude. Applied left to right; out-of-range
/// numbers are silently dropped.
pub fn parse_selection(input: &str, len: usize) -> BTreeSet<usize> {
    let mut selected = BTreeSet::new();

    for token in selection_pattern().find_iter(input) {
        let token = token.as_str();
        let exclude = token.starts_with('^');
        let body = token.trim_start_matches('^');

        let (start, end) = match body.split_once('-') {
            Some((a, b)) => match (a.parse::<usize>(), b.parse::<usize>()) {
                (Ok(a), Ok(b)) => (a, b),
                _ => continue,
            },
            None => match body.parse::<usize>() {
                Ok(n) => (n, n),
                Err(_) => continue,
            },
        };

        // clamping to the result count also bounds hostile ranges
        for n in start.max(1)..=end.min(len) {
            if exclude {
                selected.remove(&n);
            } else {
                selected.insert(n);
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_entry(repo: &str, name: &str) -> SyncPackage {
        SyncPackage {
            repo: repo.to_string(),
            name: name.to_string(),
            version: "1.0-1".to_string(),
            description: String::new(),
            download_size: 0,
            installed_size: 0,
        }
    }

    fn aur_entry(name: &str) -> AurBasic {
        AurBasic {
            name: name.to_string(),
            version: "1.0-1".to_string(),
            description: None,
            num_votes: 0,
            popularity: 0.0,
            out_of_date: None,
            maintainer: Some("someone".to_string()),
        }
    }

    #[test]
    fn test_rank_order_worst_first_best_is_index_one() {
        let results = rank(
            "nomatch",
            vec![sync_entry("extra", "e"), sync_entry("core", "c")],
            vec![aur_entry("a")],
        );
        // display order: aur, extra, core; numbering from the end
        assert_eq!(results.get(1).unwrap().name(), "c");
        assert_eq!(results.get(2).unwrap().name(), "e");
        assert_eq!(results.get(3).unwrap().name(), "a");
    }

    #[test]
    fn test_exact_match_promoted_to_index_one() {
        let results = rank(
            "widget",
            vec![sync_entry("core", "c")],
            vec![aur_entry("widget")],
        );
        // the AUR package beats a core package on exact name match
        assert_eq!(results.get(1).unwrap().name(), "widget");
        assert_eq!(results.get(2).unwrap().name(), "c");
    }

    #[test]
    fn test_get_out_of_range() {
        let results = rank("q", vec![sync_entry("core", "c")], vec![]);
        assert!(results.get(0).is_none());
        assert!(results.get(2).is_none());
    }

    #[test]
    fn test_parse_selection_singles() {
        let selected = parse_selection("1 3 5", 10);
        assert_eq!(selected, BTreeSet::from([1, 3, 5]));
    }

    #[test]
    fn test_parse_selection_range_with_exclusion() {
        let selected = parse_selection("1-3 ^2", 10);
        assert_eq!(selected, BTreeSet::from([1, 3]));
    }

    #[test]
    fn test_parse_selection_exclusion_before_inclusion_has_no_effect() {
        // exclusions only remove what earlier tokens added
        let selected = parse_selection("^2 1-3", 10);
        assert_eq!(selected, BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn test_parse_selection_out_of_range_dropped() {
        assert!(parse_selection("99", 10).is_empty());
        let selected = parse_selection("9-12", 10);
        assert_eq!(selected, BTreeSet::from([9, 10]));
    }

    #[test]
    fn test_parse_selection_excluded_range() {
        let selected = parse_selection("1-5 ^2-4", 10);
        assert_eq!(selected, BTreeSet::from([1, 5]));
    }

    #[test]
    fn test_parse_selection_garbage_ignored() {
        assert!(parse_selection("foo bar", 10).is_empty());
        assert_eq!(parse_selection("x1y", 10), BTreeSet::from([1]));
    }

    #[test]
    fn test_select_maps_numbers_to_entries() {
        let results = rank(
            "nomatch",
            vec![sync_entry("extra", "e"), sync_entry("core", "c")],
            vec![aur_entry("a")],
        );
        let picked = results.select(&BTreeSet::from([1, 3]));
        let names: Vec<&str> = picked.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["c", "a"]);
    }
}
