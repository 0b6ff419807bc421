//! External package manager client.
//!
//! All interaction with Homebrew goes through the `brew` executable as an
//! opaque subprocess: build steps stream their output straight to the user's
//! terminal, catalog queries capture `brew info --json=v2` and parse it.
//! Formula metadata lookups are cached in memory per client instance.
//!
//! The executable is discovered on `PATH`, overridable with the
//! `PORTABRU_BREW` environment variable.
//!
//! # Examples
//!
//! ```no_run
//! use portabru::brew::BrewClient;
//!
//! fn main() -> anyhow::Result<()> {
//!     let brew = BrewClient::new(false, false)?;
//!     let info = brew.info("jdx-ruby@3.4.5")?;
//!     println!("build deps: {:?}", info.build_dependencies);
//!     Ok(())
//! }
//! ```

use anyhow::{Context, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::error::{PortabruError, Result};

const BREW_ENV_OVERRIDE: &str = "PORTABRU_BREW";

/// Formula metadata from `brew info --json=v2`
#[derive(Debug, Clone, Deserialize)]
pub struct FormulaInfo {
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub versions: Versions,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub build_dependencies: Vec<String>,
    #[serde(default)]
    pub test_dependencies: Vec<String>,
    #[serde(default)]
    pub optional_dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Versions {
    #[serde(default)]
    pub stable: Option<String>,
    #[serde(default)]
    pub head: Option<String>,
    #[serde(default)]
    pub bottle: bool,
}

/// Response envelope for `--json=v2` output
#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    formulae: Vec<FormulaInfo>,
}

/// One direct dependency with the flags the resolver prunes on.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub name: String,
    pub test_only: bool,
    pub optional: bool,
}

impl FormulaInfo {
    /// Direct dependencies as annotated edges: runtime and build deps are
    /// plain, test and optional deps carry their flag.
    pub fn direct_dependencies(&self) -> Vec<DependencyEdge> {
        let plain = |name: &String| DependencyEdge {
            name: name.clone(),
            test_only: false,
            optional: false,
        };

        let mut edges: Vec<DependencyEdge> = self.dependencies.iter().map(plain).collect();
        edges.extend(self.build_dependencies.iter().map(plain));
        edges.extend(self.test_dependencies.iter().map(|name| DependencyEdge {
            name: name.clone(),
            test_only: true,
            optional: false,
        }));
        edges.extend(self.optional_dependencies.iter().map(|name| DependencyEdge {
            name: name.clone(),
            test_only: false,
            optional: true,
        }));
        edges
    }
}

/// Handle on the external `brew` executable
pub struct BrewClient {
    executable: PathBuf,
    verbose: bool,
    debug: bool,
    info_cache: moka::sync::Cache<String, FormulaInfo>,
}

impl BrewClient {
    /// Locate `brew` and build a client. Verbosity flags are replayed on
    /// every build invocation.
    pub fn new(verbose: bool, debug: bool) -> Result<Self> {
        let executable = match std::env::var_os(BREW_ENV_OVERRIDE) {
            Some(path) => PathBuf::from(path),
            None => which::which("brew").map_err(|e| {
                anyhow!("brew not found on PATH ({e}); install Homebrew or set {BREW_ENV_OVERRIDE}")
            })?,
        };

        Ok(Self::with_executable(executable, verbose, debug))
    }

    /// Build a client around a known executable path.
    pub fn with_executable(executable: PathBuf, verbose: bool, debug: bool) -> Self {
        // In-memory cache for formula lookups (lasts for command duration)
        let info_cache = moka::sync::Cache::new(1000);

        Self {
            executable,
            verbose,
            debug,
            info_cache,
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Run a `brew` subcommand, streaming its output, and fail on a non-zero
    /// exit.
    pub fn run(&self, args: &[&str]) -> Result<()> {
        let status = self.run_unchecked(args)?;

        if !status.success() {
            return Err(PortabruError::SubprocessFailure {
                command: self.render(args),
                status,
            });
        }

        Ok(())
    }

    /// Run a `brew` subcommand, streaming its output, and hand the exit
    /// status back to the caller.
    pub fn run_unchecked(&self, args: &[&str]) -> Result<std::process::ExitStatus> {
        let mut command = Command::new(&self.executable);
        command.args(args);

        if self.verbose {
            command.arg("--verbose");
        }
        if self.debug {
            command.arg("--debug");
        }

        debug!("running {}", self.render(args));

        let status = command
            .status()
            .with_context(|| format!("Failed to execute {}", self.render(args)))?;

        Ok(status)
    }

    /// Look up formula metadata via `brew info --json=v2`, cached per name.
    pub fn info(&self, name: &str) -> Result<FormulaInfo> {
        // Check cache first
        if let Some(cached) = self.info_cache.get(name) {
            return Ok(cached);
        }

        let output = Command::new(&self.executable)
            .args(["info", "--json=v2", name])
            .output()
            .with_context(|| format!("Failed to execute {}", self.render(&["info", name])))?;

        if !output.status.success() {
            debug!(
                "brew info {} failed: {}",
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(PortabruError::FormulaNotFound(name.to_string()));
        }

        let response: InfoResponse = serde_json::from_slice(&output.stdout)?;
        let formula = response
            .formulae
            .into_iter()
            .next()
            .ok_or_else(|| PortabruError::FormulaNotFound(name.to_string()))?;

        self.info_cache.insert(name.to_string(), formula.clone());
        Ok(formula)
    }

    fn render(&self, args: &[&str]) -> String {
        format!("brew {}", args.join(" "))
    }
}
