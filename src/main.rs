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

use anyhow::Result;
use clap::{ArgAction, Parser};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::Duration;

mod aur;
mod config;
mod error;
mod install;
mod logging;
mod package;
mod pacman;
mod search;

use aur::{AurClient, AurSource, BuildCache, GitFetcher, Makepkg};
use config::Config;
use error::{AurvarkError, AurvarkResult};
use install::{confirm, InstallOptions, Pipeline};
use pacman::{PacmanDatabase, SyncProvider};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "Copyright (C) 2025  aurvark contributors\n",
    "License GPLv3+: GNU GPL version 3 or later <https://gnu.org/licenses/gpl.html>\n\n",
    "This is free software; you are free to change and redistribute it.\n",
    "There is NO WARRANTY, to the extent permitted by law."
);

#[derive(Parser)]
#[command(name = "aurvark")]
#[command(version = VERSION)]
#[command(long_version = LONG_VERSION)]
#[command(about = "AUR install assistant for Arch Linux.")]
struct Cli {
    /// Sync operation (install targets by name)
    #[arg(short = 'S', long)]
    sync: bool,
    /// Search the sync databases and the AUR
    #[arg(short = 's', long)]
    search: bool,
    /// Show package information
    #[arg(short = 'i', long)]
    info: bool,
    /// Refresh the sync databases (pass twice to force)
    #[arg(short = 'y', long, action = ArgAction::Count)]
    refresh: u8,
    /// Upgrade installed packages
    #[arg(short = 'u', long)]
    sysupgrade: bool,
    /// Clean the build cache (pass twice to remove recipes too)
    #[arg(short = 'c', long, action = ArgAction::Count)]
    clean: u8,
    /// Skip version checks (pass twice to skip dependency checks)
    #[arg(short = 'd', long = "nodeps", action = ArgAction::Count)]
    nodeps: u8,
    /// Download and build, do not install
    #[arg(short = 'w', long = "downloadonly")]
    download_only: bool,
    /// Bypass confirmation prompts
    #[arg(long)]
    noconfirm: bool,
    #[arg(value_name = "TARGETS")]
    targets: Vec<String>,
}

impl Cli {
    fn install_options(&self) -> InstallOptions {
        InstallOptions {
            nodeps: self.nodeps,
            download_only: self.download_only,
            no_confirm: self.noconfirm,
        }
    }
}

/// Mutually exclusive flag pairs, rejected before any I/O
const CONFLICTS: &[(&str, &str)] = &[
    ("clean", "refresh"),
    ("clean", "search"),
    ("clean", "sysupgrade"),
    ("search", "sysupgrade"),
    ("info", "search"),
];

fn check_conflicts(cli: &Cli) -> AurvarkResult<()> {
    let active = [
        ("clean", cli.clean > 0),
        ("refresh", cli.refresh > 0),
        ("search", cli.search),
        ("sysupgrade", cli.sysupgrade),
        ("info", cli.info),
    ];
    for (first, second) in CONFLICTS {
        let first_on = active.iter().any(|(n, on)| n == first && *on);
        let second_on = active.iter().any(|(n, on)| n == second && *on);
        if first_on && second_on {
            return Err(AurvarkError::ConflictingOptions {
                first: first.to_string(),
                second: second.to_string(),
            });
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{} {}", style("error:").red().bold(), err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    check_conflicts(&cli)?;

    let config = Config::load()?;
    logging::init_with_level(&config.logging.level);

    if cli.clean > 0 {
        return clean_cache(&config, cli.clean, cli.noconfirm);
    }

    let no_operation = !cli.sync
        && !cli.search
        && !cli.info
        && cli.refresh == 0
        && !cli.sysupgrade
        && cli.targets.is_empty();
    if no_operation {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    }

    let db = PacmanDatabase::new(config.pacman.clone())?;
    let client = AurClient::new(config.aur.rpc_url.clone(), config.aur.info_cache_size)?;

    if cli.search {
        let query = cli.targets.join(" ");
        if query.is_empty() {
            return Err(AurvarkError::MissingTargets.into());
        }
        return run_search(&db, &client, &query, false, &config, &cli).await;
    }

    if cli.info {
        if cli.targets.is_empty() {
            return Err(AurvarkError::MissingTargets.into());
        }
        return show_info(&db, &client, &cli.targets).await;
    }

    if cli.refresh > 0 {
        println!("{} refreshing sync databases...", style("::").cyan().bold());
        db.refresh(cli.refresh)?;
    }
    if cli.sysupgrade {
        db.sysupgrade()?;
    }

    if cli.targets.is_empty() {
        if cli.refresh > 0 || cli.sysupgrade {
            return Ok(());
        }
        return Err(AurvarkError::MissingTargets.into());
    }

    if cli.sync {
        return run_install(&db, &client, &config, cli.install_options(), &cli.targets).await;
    }

    // default operation: search, pick interactively, install the picks
    let query = cli.targets.join(" ");
    run_search(&db, &client, &query, true, &config, &cli).await
}

/// Search both sources; optionally prompt for a selection and install it
async fn run_search(
    db: &PacmanDatabase,
    client: &AurClient,
    query: &str,
    interactive: bool,
    config: &Config,
    cli: &Cli,
) -> Result<()> {
    let sync_results = db.search(query)?;
    let aur_results = client.search(query).await?;
    let results = search::rank(query, sync_results, aur_results);

    if results.is_empty() {
        println!("no results for '{}'", query);
        return Ok(());
    }
    print!("{}", results.render(|name| db.installed_version(name)));

    if !interactive {
        return Ok(());
    }

    println!(
        "{} Packages to install (eg: 1 2 3, 1-3 or ^4)",
        style("==>").green().bold()
    );
    let input = read_line(&format!("{} ", style("==>").green().bold()))?;
    let selection = search::parse_selection(&input, results.len());
    let chosen = results.select(&selection);
    if chosen.is_empty() {
        println!(" there is nothing to do");
        return Ok(());
    }

    let targets: Vec<String> = chosen.iter().map(|e| e.name().to_string()).collect();
    run_install(db, client, config, cli.install_options(), &targets).await
}

/// The confirmed install pipeline for a set of explicit targets
async fn run_install(
    db: &PacmanDatabase,
    client: &AurClient,
    config: &Config,
    options: InstallOptions,
    targets: &[String],
) -> Result<()> {
    let no_confirm = options.no_confirm;
    let cache = BuildCache::new(&config.aur.cache_dir);
    let pipeline = Pipeline::new(db, client, &cache, config.aur.fetch_concurrency, options);

    let spinner_style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")?;
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style);
    pb.set_message("resolving dependencies...");
    pb.enable_steady_tick(Duration::from_millis(80));
    let plan = pipeline.plan(targets).await;
    pb.finish_and_clear();
    let plan = plan?;

    if plan.is_empty() {
        println!(" there is nothing to do");
        return Ok(());
    }

    print!("{}", pipeline.preview(&plan));
    if !no_confirm && !confirm("Proceed with installation?")? {
        println!(" aborted");
        return Ok(());
    }

    if !plan.build_layers.is_empty() {
        for tool in ["git", "makepkg"] {
            which::which(tool).map_err(|_| AurvarkError::Other(format!(
                "required tool '{}' not found in PATH",
                tool
            )))?;
        }
    }

    let fetcher = GitFetcher::new(config.aur.recipe_url.clone());
    pipeline.execute(&plan, &fetcher, &Makepkg, db).await?;
    Ok(())
}

/// Info display: native pass-through for sync names, RPC fields for AUR
async fn show_info(db: &PacmanDatabase, client: &AurClient, targets: &[String]) -> Result<()> {
    let (sync_found, rest) = db.get_by_names(targets)?;
    let (aur_found, missing) = client.info(&rest).await?;

    if let Some(name) = missing.first() {
        return Err(AurvarkError::PackageNotFound {
            package: name.clone(),
        }
        .into());
    }

    if !sync_found.is_empty() {
        let names: Vec<String> = sync_found.iter().map(|p| p.name.clone()).collect();
        db.print_info(&names)?;
    }

    for pkg in &aur_found {
        println!("{:<16}: aur", "Repository");
        println!("{:<16}: {}", "Name", pkg.name);
        println!("{:<16}: {}", "Version", pkg.version);
        println!(
            "{:<16}: {}",
            "Description",
            pkg.description.as_deref().unwrap_or("None")
        );
        println!("{:<16}: {}", "Votes", pkg.num_votes);
        println!("{:<16}: {:.2}", "Popularity", pkg.popularity);
        println!(
            "{:<16}: {}",
            "Maintainer",
            pkg.maintainer.as_deref().unwrap_or("None (orphaned)")
        );
        match pkg.flag_date() {
            Some(date) => println!("{:<16}: {}", "Out-of-date", date),
            None => println!("{:<16}: No", "Out-of-date"),
        }
        if !pkg.depends.is_empty() {
            println!("{:<16}: {}", "Depends On", pkg.depends.join("  "));
        }
        if !pkg.make_depends.is_empty() {
            println!("{:<16}: {}", "Make Deps", pkg.make_depends.join("  "));
        }
        if !pkg.opt_depends.is_empty() {
            println!("{:<16}: {}", "Optional Deps", pkg.opt_depends.join("  "));
        }
        println!();
    }

    Ok(())
}

/// Clean the build cache; artifacts only once, everything when repeated
fn clean_cache(config: &Config, count: u8, no_confirm: bool) -> Result<()> {
    let cache = BuildCache::new(&config.aur.cache_dir);
    if count >= 2 {
        if no_confirm || confirm("Remove ALL cached recipes and artifacts?")? {
            cache.clean()?;
            println!(" build cache removed");
        }
    } else if no_confirm || confirm("Remove built package archives from the cache?")? {
        cache.clean_artifacts()?;
        println!(" built archives removed");
    }
    Ok(())
}

fn read_line(prompt: &str) -> AurvarkResult<String> {
    print!("{}", prompt);
    std::io::stdout()
        .flush()
        .map_err(|e| AurvarkError::Other(format!("cannot write prompt: {}", e)))?;
    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| AurvarkError::Other(format!("cannot read input: {}", e)))?;
    Ok(input.trim().to_string())
}
