//! Bottle repackaging.
//!
//! `brew bottle` leaves `<formula>--<version>.<tag>.bottle.{json,tar.gz}`
//! pairs in the working directory. This module rewrites both halves into the
//! consumer-facing scheme: filenames and metadata text go through the shared
//! rename rules, the tarball's `formula/version/` nesting is flattened to a
//! single `ruby-<version>/` top-level directory, portable-dependency headers
//! are vendored in, and the metadata's version, name, and checksum fields are
//! refreshed to describe the rebuilt archive.

use anyhow::{Context, anyhow};
use chrono::Local;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use tracing::debug;
use walkdir::WalkDir;

use crate::cellar;
use crate::error::Result;
use crate::platform;
use crate::rename::{self, RenameRules};
use crate::variant::{HeaderDep, VariantConfig};

/// How one tarball was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepackOutcome {
    /// Nested bottle layout found: flattened, headers injected, re-archived.
    Restructured {
        archive: PathBuf,
        headers_injected: usize,
    },
    /// Expected nesting was absent, the file was only renamed.
    PlainRename { archive: PathBuf },
}

impl RepackOutcome {
    pub fn archive(&self) -> &Path {
        match self {
            RepackOutcome::Restructured { archive, .. } => archive,
            RepackOutcome::PlainRename { archive } => archive,
        }
    }
}

/// Everything one repackaging pass produced.
#[derive(Debug, Default)]
pub struct RepackReport {
    pub archives: Vec<RepackOutcome>,
    pub metadata: Vec<PathBuf>,
}

/// A rebuilt archive, remembered so the metadata pass can point at it.
struct ArchiveRecord {
    original_name: String,
    new_name: String,
    sha256: String,
}

/// Rewrite every bottle artifact for `formula` found in `dir`.
///
/// Tarballs are processed first so the metadata pass can patch checksums of
/// the rebuilt archives. `cellar` is where header-dependency kegs are looked
/// up.
pub fn repackage_bottles(
    variant: &VariantConfig,
    formula: &str,
    no_yjit: bool,
    dir: &Path,
    cellar: &Path,
) -> Result<RepackReport> {
    let tarball_rules = RenameRules::for_tarball(variant, formula, no_yjit)?;
    let json_rules = RenameRules::for_json(variant, formula, no_yjit)?;

    let mut report = RepackReport::default();
    let mut records = Vec::new();

    for path in matching_files(dir, formula, ".tar.gz")? {
        let (outcome, record) = repack_tarball(variant, &tarball_rules, &path, cellar)?;
        report.archives.push(outcome);
        records.push(record);
    }

    let metadata_prefix = format!("{formula}--");
    for path in matching_files(dir, &metadata_prefix, ".bottle.json")? {
        let rewritten = rewrite_metadata(variant, &json_rules, &path, &records)?;
        report.metadata.push(rewritten);
    }

    Ok(report)
}

/// Copy the `include/` trees of the variant's portable dependencies into
/// `dest`, returning how many files were copied. Missing dependencies are
/// skipped.
pub fn inject_headers(
    cellar: &Path,
    deps: &[HeaderDep],
    on_linux: bool,
    dest: &Path,
) -> Result<usize> {
    let mut copied = 0;

    for dep in deps {
        if dep.linux_only && !on_linux {
            continue;
        }
        let Some(keg) = cellar::newest_with_prefix(cellar, dep.prefix)? else {
            debug!("{} not installed, skipping header injection", dep.prefix);
            continue;
        };
        let Some(include) = keg.include_dir() else {
            debug!("{} ships no headers", keg.name);
            continue;
        };
        copied += copy_tree(&include, dest)?;
    }

    Ok(copied)
}

fn repack_tarball(
    variant: &VariantConfig,
    rules: &RenameRules,
    path: &Path,
    cellar: &Path,
) -> Result<(RepackOutcome, ArchiveRecord)> {
    let original_name = file_name_str(path)?;
    let new_name = rules.apply(&original_name);
    let target = path.with_file_name(&new_name);

    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;

    {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open bottle: {}", path.display()))?;
        let mut archive = Archive::new(GzDecoder::new(file));
        // Keep executable bits through the round trip.
        archive.set_preserve_permissions(true);
        archive
            .unpack(scratch.path())
            .with_context(|| format!("Failed to extract bottle: {}", path.display()))?;
    }

    let outcome = match locate_version_dir(scratch.path()) {
        Some(version_dir) => {
            let version = file_name_str(&version_dir)?;
            let top_name = rules.apply(&format!("{}-{}", variant.product, version));
            let top_dir = scratch.path().join(&top_name);
            fs::rename(&version_dir, &top_dir)
                .with_context(|| format!("Failed to flatten {}", version_dir.display()))?;

            let headers_injected = inject_headers(
                cellar,
                variant.header_deps,
                platform::on_linux(),
                &top_dir.join("include"),
            )?;

            write_archive(&target, &top_name, &top_dir)?;
            if target != path {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }

            RepackOutcome::Restructured {
                archive: target,
                headers_injected,
            }
        }
        None => {
            debug!("{original_name} has no nested bottle layout, renaming only");
            if target != path {
                fs::rename(path, &target)
                    .with_context(|| format!("Failed to rename {}", path.display()))?;
            }
            RepackOutcome::PlainRename { archive: target }
        }
    };

    let sha256 = file_sha256(outcome.archive())?;
    Ok((
        outcome,
        ArchiveRecord {
            original_name,
            new_name,
            sha256,
        },
    ))
}

/// Rewrite one bottle JSON: textual rules, then the structured name, version,
/// and checksum fields. Returns the rewritten file's path.
fn rewrite_metadata(
    variant: &VariantConfig,
    rules: &RenameRules,
    path: &Path,
    records: &[ArchiveRecord],
) -> Result<PathBuf> {
    let original_name = file_name_str(path)?;
    let new_name = rules.apply(&original_name);
    let commit = rename::extract_head_commit(&original_name);

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
    let mut doc: Value = serde_json::from_str(&rules.apply(&text))?;

    let date = Local::now().format("%Y%m%d").to_string();
    let version = match &commit {
        Some(hash) => format!("{date}-{hash}"),
        None => date,
    };

    // Unknown fields survive: the document is edited as a tree, never
    // rebuilt from a typed struct.
    if let Some(entries) = doc.as_object_mut() {
        for entry in entries.values_mut() {
            if let Some(formula_obj) = entry.get_mut("formula").and_then(Value::as_object_mut) {
                if let Some(name) = formula_obj.get("name").and_then(Value::as_str) {
                    let product = variant.product_name(name);
                    formula_obj.insert("name".to_string(), Value::String(product));
                }
                formula_obj.insert("pkg_version".to_string(), Value::String(version.clone()));
            }
            patch_tags(entry, rules, records);
        }
    }

    let target = path.with_file_name(&new_name);
    let pretty = serde_json::to_string_pretty(&doc)?;
    fs::write(&target, pretty)
        .with_context(|| format!("Failed to write metadata: {}", target.display()))?;
    if target != path {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    Ok(target)
}

/// Point each bottle tag at its rebuilt archive: the recorded
/// `local_filename` picks the record, `sha256` takes the recomputed digest.
fn patch_tags(entry: &mut Value, rules: &RenameRules, records: &[ArchiveRecord]) {
    let Some(tags) = entry
        .get_mut("bottle")
        .and_then(|bottle| bottle.get_mut("tags"))
        .and_then(Value::as_object_mut)
    else {
        return;
    };

    for tag in tags.values_mut() {
        let Some(tag_obj) = tag.as_object_mut() else {
            continue;
        };
        let Some(current) = tag_obj.get("local_filename").and_then(Value::as_str) else {
            continue;
        };

        // local_filename went through the metadata rules with the rest of
        // the text; run the recorded originals through the same lens to
        // find the match.
        let matched = records
            .iter()
            .find(|record| rules.apply(&record.original_name) == current);
        if let Some(record) = matched {
            tag_obj.insert(
                "local_filename".to_string(),
                Value::String(record.new_name.clone()),
            );
            tag_obj.insert("sha256".to_string(), Value::String(record.sha256.clone()));
        }
    }
}

/// Bottle archives nest `<formula>/<version>/...`. Returns the version
/// directory if the layout matches, `None` otherwise.
fn locate_version_dir(root: &Path) -> Option<PathBuf> {
    let formula_dir = sole_subdir(root)?;
    sole_subdir(&formula_dir)
}

fn sole_subdir(dir: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir).ok()?.flatten();
    let first = entries.next()?;
    if entries.next().is_some() {
        return None;
    }
    let path = first.path();
    path.is_dir().then_some(path)
}

fn write_archive(target: &Path, top_name: &str, top_dir: &Path) -> Result<()> {
    let file = fs::File::create(target)
        .with_context(|| format!("Failed to create archive: {}", target.display()))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder
        .append_dir_all(top_name, top_dir)
        .with_context(|| format!("Failed to archive {}", top_dir.display()))?;
    builder
        .into_inner()
        .context("Failed to flush archive")?
        .finish()
        .context("Failed to finish gzip stream")?;
    Ok(())
}

fn copy_tree(src: &Path, dest: &Path) -> Result<usize> {
    let mut files = 0;

    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.context("Failed to walk header tree")?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .context("Walked outside the header tree")?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            files += 1;
        }
    }

    Ok(files)
}

fn file_sha256(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn file_name_str(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("Path has no file name: {}", path.display()).into())
}

fn matching_files(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) && name.ends_with(suffix) && entry.path().is_file() {
            paths.push(entry.path());
        }
    }

    paths.sort();
    Ok(paths)
}
