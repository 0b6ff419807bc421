//! Build driver.
//!
//! Runs the fixed `brew` subcommand sequence that turns a formula plus its
//! resolved dependency sets into bottle artifacts in the working directory:
//! install prebuilt deps, build source deps, build the target, drop the
//! source deps again, test, check linkage, bottle. Every step streams the
//! package manager's own output; the first failing step aborts the sequence.

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::brew::BrewClient;
use crate::cellar;
use crate::error::Result;
use crate::resolver::ResolvedDeps;
use crate::variant::VariantConfig;

pub struct BuildOptions {
    /// Leave source-built dependencies installed after the target build.
    pub keep_deps: bool,
    /// Build without YJIT and prune its toolchain.
    pub no_yjit: bool,
    /// Homebrew prefix consulted by the certificate preflight.
    pub prefix: PathBuf,
}

impl BuildOptions {
    pub fn new(keep_deps: bool, no_yjit: bool) -> Self {
        Self {
            keep_deps,
            no_yjit,
            prefix: cellar::detect_prefix(),
        }
    }
}

/// Drive one formula through the full build-and-bottle sequence.
pub fn build_bottle(
    brew: &BrewClient,
    variant: &VariantConfig,
    formula: &str,
    deps: &ResolvedDeps,
    opts: &BuildOptions,
) -> Result<()> {
    ensure_ca_certificates(brew, &opts.prefix)?;

    if !deps.bottled.is_empty() {
        let mut args = vec!["install"];
        args.extend(deps.bottled.iter().map(String::as_str));
        brew.run(&args)?;
    }

    if !deps.source.is_empty() {
        let mut args = vec!["install", "--build-bottle"];
        args.extend(deps.source.iter().map(String::as_str));
        brew.run(&args)?;
    }

    let mut args = vec!["install", "--build-bottle"];
    if opts.no_yjit {
        args.push(variant.yjit_build_flag);
    }
    // Unpinned formulae track upstream, so the build follows HEAD.
    if !formula.contains('@') {
        args.push("--HEAD");
    }
    args.push(formula);
    brew.run(&args)?;

    if !opts.keep_deps && !deps.source.is_empty() {
        let mut args = vec!["uninstall"];
        args.extend(deps.source.iter().map(String::as_str));
        brew.run(&args)?;
    }

    brew.run(&["test", formula])?;

    // Informational only. Portable bottles link statically on purpose, which
    // `brew linkage` reports as a failure.
    let status = brew.run_unchecked(&["linkage", formula])?;
    if !status.success() {
        warn!("brew linkage {formula} exited with {status}");
    }

    let root_url = format!("--root-url={}", variant.root_url);
    brew.run(&[
        "bottle",
        "--json",
        "--skip-relocation",
        "--no-rebuild",
        &root_url,
        formula,
    ])?;

    Ok(())
}

/// Builds hit the network through Homebrew's bundled curl, which needs a
/// trust store. Install `ca-certificates` once if neither the bundle file
/// nor the formula is present.
fn ensure_ca_certificates(brew: &BrewClient, prefix: &Path) -> Result<()> {
    let bundle = prefix.join("etc/ca-certificates/cert.pem");
    if bundle.exists() || cellar::is_installed(&prefix.join("Cellar"), "ca-certificates") {
        return Ok(());
    }

    brew.run(&["install", "ca-certificates"])
}
