//! drydock CLI - dependency metadata resolution for Python package indexes

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pep440_rs::Version;
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;
use url::Url;

use drydock::core::{DependencySet, Requirement};
use drydock::resolver::Resolver;
use drydock::store::{CommandBuilder, DiskStore};
use drydock::util::Config;

mod cli;

use cli::Cli;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging; stderr keeps --json output clean
    let filter = if cli.verbose {
        EnvFilter::new("drydock=debug")
    } else {
        EnvFilter::new("drydock=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::default_path() {
        Some(path) => Config::load_or_default(&path),
        None => Config::default(),
    };

    // Gather requirement texts from arguments and the optional file
    let mut texts = cli.requirements.clone();
    if let Some(ref path) = cli.requirements_file {
        texts.extend(read_requirements_file(path)?);
    }
    if texts.is_empty() {
        bail!("no requirements given; pass them as arguments or with --requirements-file");
    }

    // An unparsable requirement is caller error: fail before any network
    let requirements: Vec<Requirement> = texts
        .iter()
        .map(|text| {
            Requirement::parse(text).with_context(|| format!("invalid requirement `{}`", text))
        })
        .collect::<Result<_>>()?;

    let resolver = build_resolver(&cli, &config)?;
    let allow_network = !cli.offline;

    // Requirements are independent queries; the shared caches make the
    // concurrent fan-out safe and cheap
    let results: Vec<(usize, Result<DependencySet>)> = requirements
        .par_iter()
        .enumerate()
        .map(|(i, requirement)| (i, resolver.resolve_dependencies(requirement, allow_network)))
        .collect();

    let mut resolved: Vec<(usize, DependencySet)> = Vec::with_capacity(results.len());
    for (i, result) in results {
        resolved.push((i, result?));
    }
    resolved.sort_by_key(|(i, _)| *i);

    if cli.json {
        print_json(&requirements, &resolved)?;
    } else {
        print_listing(&requirements, &resolved);
    }

    Ok(())
}

fn build_resolver(cli: &Cli, config: &Config) -> Result<Resolver> {
    let index_url = cli
        .index_url
        .clone()
        .unwrap_or_else(|| config.index.url.clone());
    let listing_url =
        Url::parse(&index_url).with_context(|| format!("invalid index URL `{}`", index_url))?;

    let cache_dir = cli
        .cache_dir
        .clone()
        .or_else(|| config.cache_dir())
        .context("could not determine a cache directory")?;

    let store = Arc::new(DiskStore::new(cache_dir));
    let builder =
        CommandBuilder::new(&config.build.command).context("empty [build] command in config")?;

    let mut resolver = Resolver::for_index(listing_url, store, Arc::new(builder))
        .with_fallback(config.index.fallback.clone());

    let page_entries = config.cache.page_entries;
    resolver = resolver.map_listing(|listing| listing.with_page_capacity(page_entries));

    if let Some(ref python) = cli.python {
        let version: Version = python
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid --python version `{}`: {}", python, e))?;
        resolver = resolver.map_listing(|listing| listing.with_interpreter(version));
    }

    Ok(resolver)
}

/// Read requirement lines from a file, skipping blanks, comments, and
/// option lines.
fn read_requirements_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read requirements file: {}", path.display()))?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("--"))
        .map(str::to_string)
        .collect())
}

fn print_listing(requirements: &[Requirement], resolved: &[(usize, DependencySet)]) {
    for (i, set) in resolved {
        let requirement = &requirements[*i];
        println!("{}", requirement);

        let extras = requirement.extras().iter().map(String::as_str);
        let mut any = false;
        for dependency in set.iter_with_extras(extras) {
            println!("  {}", dependency);
            any = true;
        }
        if !any {
            println!("  (no dependencies)");
        }
    }
}

fn print_json(requirements: &[Requirement], resolved: &[(usize, DependencySet)]) -> Result<()> {
    let entries: Vec<serde_json::Value> = resolved
        .iter()
        .map(|(i, set)| {
            let extras: serde_json::Map<String, serde_json::Value> = set
                .extras()
                .iter()
                .map(|(name, deps)| {
                    let deps: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
                    (name.clone(), serde_json::json!(deps))
                })
                .collect();

            serde_json::json!({
                "requirement": requirements[*i].to_string(),
                "base": set.base().iter().map(|d| d.to_string()).collect::<Vec<_>>(),
                "extras": extras,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
