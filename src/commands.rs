//! The per-formula bottling pipeline: resolve, build, repackage.

use anyhow::anyhow;
use colored::Colorize;
use indicatif::ProgressBar;
use std::path::Path;
use std::time::Duration;

use crate::brew::BrewClient;
use crate::build::{self, BuildOptions};
use crate::cellar;
use crate::error::Result;
use crate::repack::{self, RepackOutcome, RepackReport};
use crate::resolver::Resolver;
use crate::variant::VariantConfig;

pub struct PipelineOptions {
    pub keep_deps: bool,
    pub no_yjit: bool,
    pub verbose: bool,
    pub debug: bool,
}

/// Run the pipeline for each formula in turn. A failing formula is reported
/// and skipped; the error is returned only after every formula had its try.
pub fn bottle(variant: &VariantConfig, formulae: &[String], opts: &PipelineOptions) -> Result<()> {
    let brew = BrewClient::new(opts.verbose, opts.debug)?;
    let resolver = Resolver::new();

    println!(
        "Bottling {} {} formulae...",
        formulae.len().to_string().bold(),
        variant.name
    );

    let mut failures = Vec::new();

    for formula in formulae {
        println!("\n{}", format!("==> {}", formula).bold().green());

        match process_formula(&brew, &resolver, variant, formula, opts) {
            Ok(report) => print_report(&report),
            Err(e) => {
                println!("  {} {}: {}", "✗".red(), formula.bold(), e);
                failures.push(formula.clone());
            }
        }
    }

    println!();
    if failures.is_empty() {
        println!(
            "{} Bottled {} formulae",
            "✓".green(),
            formulae.len().to_string().bold()
        );
        return Ok(());
    }

    println!(
        "{} {} of {} formulae failed: {}",
        "✗".red(),
        failures.len().to_string().bold(),
        formulae.len(),
        failures.join(", ")
    );
    Err(anyhow!("{} of {} formulae failed", failures.len(), formulae.len()).into())
}

fn process_formula(
    brew: &BrewClient,
    resolver: &Resolver,
    variant: &VariantConfig,
    formula: &str,
    opts: &PipelineOptions,
) -> Result<RepackReport> {
    let cache_key = format!("{}:{}:{}", variant.name, formula, opts.no_yjit);
    let deps = resolver.resolve(brew, variant, formula, opts.no_yjit, &cache_key)?;

    if !deps.bottled.is_empty() {
        println!("  {}: {}", "Bottled deps".bold(), deps.bottled.join(", "));
    }
    if !deps.source.is_empty() {
        println!("  {}: {}", "Source deps".bold(), deps.source.join(", "));
    }

    build::build_bottle(
        brew,
        variant,
        formula,
        &deps,
        &BuildOptions::new(opts.keep_deps, opts.no_yjit),
    )?;

    // The build steps stream brew's own output; repackaging is local and
    // quiet, so it gets a spinner instead.
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Repackaging {formula}..."));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let report = repack::repackage_bottles(
        variant,
        formula,
        opts.no_yjit,
        &std::env::current_dir()?,
        &cellar::cellar_path(),
    );

    spinner.finish_and_clear();
    report
}

fn print_report(report: &RepackReport) {
    if report.archives.is_empty() && report.metadata.is_empty() {
        println!("  {} no bottle artifacts found", "⚠".yellow());
        return;
    }

    for outcome in &report.archives {
        match outcome {
            RepackOutcome::Restructured {
                archive,
                headers_injected,
            } => {
                if *headers_injected > 0 {
                    println!(
                        "  {} {} {}",
                        "✓".green(),
                        display_name(archive).bold(),
                        format!("({headers_injected} headers vendored)").dimmed()
                    );
                } else {
                    println!("  {} {}", "✓".green(), display_name(archive).bold());
                }
            }
            RepackOutcome::PlainRename { archive } => {
                println!(
                    "  {} {} {}",
                    "⚠".yellow(),
                    display_name(archive).bold(),
                    "(renamed only, unexpected archive layout)".dimmed()
                );
            }
        }
    }

    for path in &report.metadata {
        println!("  {} {}", "✓".green(), display_name(path).bold());
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
