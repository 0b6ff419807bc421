//! Homebrew Cellar inspection - locating installed keg contents.

use anyhow::Context;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Detect the Homebrew prefix on this system
pub fn detect_prefix() -> PathBuf {
    // First check environment variable
    if let Ok(prefix) = std::env::var("HOMEBREW_PREFIX") {
        return PathBuf::from(prefix);
    }

    // Detect by architecture
    #[cfg(target_arch = "aarch64")]
    {
        PathBuf::from("/opt/homebrew")
    }
    #[cfg(target_arch = "x86_64")]
    {
        PathBuf::from("/usr/local")
    }
    #[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
    {
        PathBuf::from("/usr/local")
    }
}

/// Get the Cellar directory path
pub fn cellar_path() -> PathBuf {
    detect_prefix().join("Cellar")
}

/// One installed keg: a `Cellar/<formula>/<version>` directory.
#[derive(Debug, Clone)]
pub struct InstalledFormula {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

impl InstalledFormula {
    /// The keg's `include/` directory, if it ships headers.
    pub fn include_dir(&self) -> Option<PathBuf> {
        let dir = self.path.join("include");
        dir.is_dir().then_some(dir)
    }
}

/// Whether any version of `formula` is present in the Cellar.
pub fn is_installed(cellar: &Path, formula: &str) -> bool {
    let formula_path = cellar.join(formula);
    match fs::read_dir(&formula_path) {
        Ok(entries) => entries
            .flatten()
            .any(|e| !e.file_name().to_string_lossy().starts_with('.')),
        Err(_) => false,
    }
}

/// Get all installed versions of a formula, sorted newest first.
pub fn installed_versions(cellar: &Path, formula: &str) -> Result<Vec<InstalledFormula>> {
    let formula_path = cellar.join(formula);

    if !formula_path.exists() {
        return Ok(vec![]);
    }

    let mut kegs = Vec::new();

    for entry in fs::read_dir(&formula_path)
        .with_context(|| format!("Failed to read keg dir: {}", formula_path.display()))?
    {
        let entry = entry?;
        let version = entry.file_name().to_string_lossy().to_string();

        // Skip hidden files
        if version.starts_with('.') {
            continue;
        }

        kegs.push(InstalledFormula {
            name: formula.to_string(),
            version,
            path: entry.path(),
        });
    }

    // Sort by version - newest first
    kegs.sort_by(|a, b| compare_versions(&a.version, &b.version));
    kegs.reverse();

    Ok(kegs)
}

/// Find the newest installed keg whose formula name starts with `prefix`.
///
/// Versioned formulae like `glibc@2.35` install under their full name, so a
/// caller holding only the `glibc@` family prefix can still locate the keg.
pub fn newest_with_prefix(cellar: &Path, prefix: &str) -> Result<Option<InstalledFormula>> {
    if !cellar.exists() {
        return Ok(None);
    }

    let mut best: Option<InstalledFormula> = None;

    for entry in fs::read_dir(cellar)
        .with_context(|| format!("Failed to read Cellar: {}", cellar.display()))?
    {
        let entry = entry?;
        let formula = entry.file_name().to_string_lossy().to_string();

        if formula.starts_with('.') || !formula.starts_with(prefix) {
            continue;
        }

        if let Some(keg) = installed_versions(cellar, &formula)?.into_iter().next() {
            let newer = match &best {
                Some(current) => compare_versions(&keg.version, &current.version) == Ordering::Greater,
                None => true,
            };
            if newer {
                best = Some(keg);
            }
        }
    }

    Ok(best)
}

/// Compare two version strings semantically
fn compare_versions(a: &str, b: &str) -> Ordering {
    // Parse as semantic version numbers
    let a_parts: Vec<u32> = a.split('.').filter_map(|s| s.parse::<u32>().ok()).collect();
    let b_parts: Vec<u32> = b.split('.').filter_map(|s| s.parse::<u32>().ok()).collect();

    // Compare version parts numerically
    for i in 0..a_parts.len().max(b_parts.len()) {
        let a_part = a_parts.get(i).unwrap_or(&0);
        let b_part = b_parts.get(i).unwrap_or(&0);
        match a_part.cmp(b_part) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    // Fall back to lexicographic
    a.cmp(b)
}
