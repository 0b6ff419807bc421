//! End-to-end repackaging tests: real tarballs and bottle JSON go in, the
//! consumer-facing artifacts come out.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use portabru::repack::{self, RepackOutcome};
use portabru::variant;

struct Workbench {
    _temp: TempDir,
    work: PathBuf,
    cellar: PathBuf,
    inspect: PathBuf,
}

impl Workbench {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let cellar = temp.path().join("Cellar");
        let inspect = temp.path().join("inspect");
        fs::create_dir_all(&work).unwrap();
        fs::create_dir_all(&cellar).unwrap();

        Self {
            _temp: temp,
            work,
            cellar,
            inspect,
        }
    }

    fn seed_header_keg(&self, formula: &str, version: &str, headers: &[&str]) {
        for header in headers {
            let path = self
                .cellar
                .join(formula)
                .join(version)
                .join("include")
                .join(header);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, format!("// {header}\n")).unwrap();
        }
    }

    /// Build a bottle tarball nesting `<formula>/<version>/<files...>`.
    fn make_bottle(&self, file_name: &str, formula: &str, version: &str, files: &[(&str, &str)]) {
        let staging = TempDir::new().unwrap();
        let root = staging.path().join(formula).join(version);
        for (rel, content) in files {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
        }
        self.archive_staging(file_name, staging.path(), formula);
    }

    fn archive_staging(&self, file_name: &str, staging: &Path, top: &str) {
        let file = fs::File::create(self.work.join(file_name)).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        builder.follow_symlinks(false);
        builder.append_dir_all(top, staging.join(top)).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_metadata(&self, file_name: &str, doc: &serde_json::Value) {
        fs::write(
            self.work.join(file_name),
            serde_json::to_string_pretty(doc).unwrap(),
        )
        .unwrap();
    }

    fn extract(&self, archive_name: &str) -> PathBuf {
        let file = fs::File::open(self.work.join(archive_name)).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive.set_preserve_permissions(true);
        archive.unpack(&self.inspect).unwrap();
        self.inspect.clone()
    }
}

fn bottle_json(formula: &str, version: &str, tag: &str, local_filename: &str) -> serde_json::Value {
    json!({
        formula: {
            "formula": {
                "name": formula,
                "pkg_version": version,
                "path": format!("Formula/{formula}.rb")
            },
            "bottle": {
                "root_url": "https://github.com/jdx/portable-ruby/releases/download",
                "cellar": ":any_skip_relocation",
                "rebuild": 0,
                "tags": {
                    tag: {
                        "filename": local_filename.replace("--", "-"),
                        "local_filename": local_filename,
                        "id": 17,
                        "sha256": "0".repeat(64)
                    }
                }
            },
            "bintray": {"package": formula, "repository": "bottles"}
        }
    })
}

fn sha256_hex(path: &Path) -> String {
    format!("{:x}", Sha256::digest(fs::read(path).unwrap()))
}

fn top_level(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_restructures_nested_bottle_and_vendors_headers() {
    let bench = Workbench::new();
    bench.seed_header_keg("portable-openssl", "3.5.0", &["openssl/ssl.h"]);
    bench.seed_header_keg("portable-libyaml", "0.2.5", &["yaml.h"]);

    bench.make_bottle(
        "jdx-ruby@3.4.5--3.4.5.arm64_sequoia.bottle.tar.gz",
        "jdx-ruby@3.4.5",
        "3.4.5",
        &[
            ("bin/ruby", "#!/usr/bin/env ruby"),
            ("lib/libruby.3.4.dylib", "not really a dylib"),
            ("LICENSE", "BSD-2-Clause"),
        ],
    );

    let report = repack::repackage_bottles(
        &variant::JDX,
        "jdx-ruby@3.4.5",
        false,
        &bench.work,
        &bench.cellar,
    )
    .unwrap();

    assert_eq!(report.archives.len(), 1);
    match &report.archives[0] {
        RepackOutcome::Restructured {
            archive,
            headers_injected,
        } => {
            assert!(archive.ends_with("ruby-3.4.5.macos.bottle.tar.gz"));
            assert_eq!(*headers_injected, 2);
        }
        other => panic!("expected a restructured archive, got {other:?}"),
    }
    assert!(
        !bench
            .work
            .join("jdx-ruby@3.4.5--3.4.5.arm64_sequoia.bottle.tar.gz")
            .exists()
    );

    let tree = bench.extract("ruby-3.4.5.macos.bottle.tar.gz");
    assert_eq!(top_level(&tree), vec!["ruby-3.4.5"]);
    let root = tree.join("ruby-3.4.5");
    assert_eq!(
        fs::read_to_string(root.join("bin/ruby")).unwrap(),
        "#!/usr/bin/env ruby"
    );
    assert!(root.join("lib/libruby.3.4.dylib").exists());
    assert!(root.join("LICENSE").exists());
    assert!(root.join("include/openssl/ssl.h").exists());
    assert!(root.join("include/yaml.h").exists());
}

#[test]
fn test_rewrites_metadata_to_describe_the_new_archive() {
    let bench = Workbench::new();
    bench.make_bottle(
        "jdx-ruby@3.4.5--3.4.5.arm64_sequoia.bottle.tar.gz",
        "jdx-ruby@3.4.5",
        "3.4.5",
        &[("bin/ruby", "ruby")],
    );
    bench.write_metadata(
        "jdx-ruby@3.4.5--3.4.5.arm64_sequoia.bottle.json",
        &bottle_json(
            "jdx-ruby@3.4.5",
            "3.4.5",
            "arm64_sequoia",
            "jdx-ruby@3.4.5--3.4.5.arm64_sequoia.bottle.tar.gz",
        ),
    );

    let report = repack::repackage_bottles(
        &variant::JDX,
        "jdx-ruby@3.4.5",
        false,
        &bench.work,
        &bench.cellar,
    )
    .unwrap();

    assert_eq!(report.metadata.len(), 1);
    let json_path = bench.work.join("ruby-3.4.5.macos.bottle.json");
    assert!(json_path.exists());
    assert!(
        !bench
            .work
            .join("jdx-ruby@3.4.5--3.4.5.arm64_sequoia.bottle.json")
            .exists()
    );

    let doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    let entry = &doc["jdx-ruby@3.4.5"];

    assert_eq!(entry["formula"]["name"], "ruby@3.4.5");
    let today = chrono::Local::now().format("%Y%m%d").to_string();
    assert_eq!(entry["formula"]["pkg_version"], today.as_str());

    // The platform tag collapsed with the rest of the text.
    let tag = &entry["bottle"]["tags"]["macos"];
    assert_eq!(tag["local_filename"], "ruby-3.4.5.macos.bottle.tar.gz");
    assert_eq!(
        tag["sha256"],
        sha256_hex(&bench.work.join("ruby-3.4.5.macos.bottle.tar.gz")).as_str()
    );

    // Fields the rewrite does not know about survive it.
    assert_eq!(tag["id"], 17);
    assert_eq!(entry["bintray"]["repository"], "bottles");
}

#[test]
fn test_head_bottle_gets_dev_archive_and_dated_version() {
    let bench = Workbench::new();
    bench.make_bottle(
        "jdx-ruby@3.4.5--3.4.5-HEAD-1a2b3c4.arm64_sequoia.bottle.tar.gz",
        "jdx-ruby@3.4.5",
        "HEAD-1a2b3c4",
        &[("bin/ruby", "ruby")],
    );
    bench.write_metadata(
        "jdx-ruby@3.4.5--3.4.5-HEAD-1a2b3c4.arm64_sequoia.bottle.json",
        &bottle_json(
            "jdx-ruby@3.4.5",
            "3.4.5-HEAD-1a2b3c4",
            "arm64_sequoia",
            "jdx-ruby@3.4.5--3.4.5-HEAD-1a2b3c4.arm64_sequoia.bottle.tar.gz",
        ),
    );

    repack::repackage_bottles(
        &variant::JDX,
        "jdx-ruby@3.4.5",
        false,
        &bench.work,
        &bench.cellar,
    )
    .unwrap();

    // Tarball keeps a generic dev marker, metadata drops the fragment.
    let archive = bench.work.join("ruby-3.4.5-dev.macos.bottle.tar.gz");
    let json_path = bench.work.join("ruby-3.4.5.macos.bottle.json");
    assert!(archive.exists());
    assert!(json_path.exists());

    let tree = bench.extract("ruby-3.4.5-dev.macos.bottle.tar.gz");
    assert_eq!(top_level(&tree), vec!["ruby-dev"]);

    // The commit resurfaces in the version field, after today's date.
    let doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    let entry = &doc["jdx-ruby@3.4.5"];
    let today = chrono::Local::now().format("%Y%m%d").to_string();
    assert_eq!(
        entry["formula"]["pkg_version"],
        format!("{today}-1a2b3c4").as_str()
    );

    // Correlation across the one divergent rule: the metadata still points
    // at the -dev tarball by its real name.
    let tag = &entry["bottle"]["tags"]["macos"];
    assert_eq!(tag["local_filename"], "ruby-3.4.5-dev.macos.bottle.tar.gz");
    assert_eq!(tag["sha256"], sha256_hex(&archive).as_str());
}

#[test]
fn test_no_yjit_marks_every_artifact() {
    let bench = Workbench::new();
    bench.make_bottle(
        "portable-ruby@3.3--3.3.9.x86_64_linux.bottle.tar.gz",
        "portable-ruby@3.3",
        "3.3.9",
        &[("bin/ruby", "ruby")],
    );
    bench.write_metadata(
        "portable-ruby@3.3--3.3.9.x86_64_linux.bottle.json",
        &bottle_json(
            "portable-ruby@3.3",
            "3.3.9",
            "x86_64_linux",
            "portable-ruby@3.3--3.3.9.x86_64_linux.bottle.tar.gz",
        ),
    );

    let report = repack::repackage_bottles(
        &variant::PORTABLE,
        "portable-ruby@3.3",
        true,
        &bench.work,
        &bench.cellar,
    )
    .unwrap();

    // Linux tags pass through; the portable variant vendors no headers.
    match &report.archives[0] {
        RepackOutcome::Restructured {
            archive,
            headers_injected,
        } => {
            assert!(archive.ends_with("ruby-3.3.9.x86_64_linux.no_yjit.tar.gz"));
            assert_eq!(*headers_injected, 0);
        }
        other => panic!("expected a restructured archive, got {other:?}"),
    }
    assert!(bench.work.join("ruby-3.3.9.x86_64_linux.no_yjit.json").exists());

    let doc: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(bench.work.join("ruby-3.3.9.x86_64_linux.no_yjit.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        doc["portable-ruby@3.3"]["formula"]["name"],
        "ruby@3.3"
    );
}

#[test]
fn test_unexpected_layout_degrades_to_plain_rename() {
    let bench = Workbench::new();

    // Two top-level directories: not a bottle layout.
    let staging = TempDir::new().unwrap();
    fs::create_dir_all(staging.path().join("jdx-ruby@3.4.5/3.4.5")).unwrap();
    fs::write(staging.path().join("jdx-ruby@3.4.5/3.4.5/ruby"), "ruby").unwrap();
    fs::create_dir_all(staging.path().join("stray")).unwrap();
    fs::write(staging.path().join("stray/file"), "x").unwrap();

    let file = fs::File::create(
        bench
            .work
            .join("jdx-ruby@3.4.5--3.4.5.arm64_sequoia.bottle.tar.gz"),
    )
    .unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder
        .append_dir_all("jdx-ruby@3.4.5", staging.path().join("jdx-ruby@3.4.5"))
        .unwrap();
    builder.append_dir_all("stray", staging.path().join("stray")).unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    let before = sha256_hex(
        &bench
            .work
            .join("jdx-ruby@3.4.5--3.4.5.arm64_sequoia.bottle.tar.gz"),
    );

    let report = repack::repackage_bottles(
        &variant::JDX,
        "jdx-ruby@3.4.5",
        false,
        &bench.work,
        &bench.cellar,
    )
    .unwrap();

    let renamed = bench.work.join("ruby-3.4.5.macos.bottle.tar.gz");
    assert_eq!(
        report.archives,
        vec![RepackOutcome::PlainRename {
            archive: renamed.clone()
        }]
    );
    // Renamed, never rebuilt.
    assert_eq!(sha256_hex(&renamed), before);
}

#[test]
fn test_unrelated_files_are_left_alone() {
    let bench = Workbench::new();
    bench.make_bottle(
        "jdx-ruby@3.4.5--3.4.5.arm64_sequoia.bottle.tar.gz",
        "jdx-ruby@3.4.5",
        "3.4.5",
        &[("bin/ruby", "ruby")],
    );
    bench.make_bottle(
        "zlib--1.3.1.x86_64_linux.bottle.tar.gz",
        "zlib",
        "1.3.1",
        &[("lib/libz.a", "archive")],
    );
    fs::write(bench.work.join("notes.txt"), "scratch").unwrap();

    repack::repackage_bottles(
        &variant::JDX,
        "jdx-ruby@3.4.5",
        false,
        &bench.work,
        &bench.cellar,
    )
    .unwrap();

    assert!(bench.work.join("zlib--1.3.1.x86_64_linux.bottle.tar.gz").exists());
    assert!(bench.work.join("notes.txt").exists());
    assert!(bench.work.join("ruby-3.4.5.macos.bottle.tar.gz").exists());
}

#[cfg(unix)]
#[test]
fn test_modes_and_symlinks_survive_the_round_trip() {
    use std::os::unix::fs::PermissionsExt;

    let bench = Workbench::new();

    let staging = TempDir::new().unwrap();
    let root = staging.path().join("jdx-ruby@3.4.5/3.4.5");
    fs::create_dir_all(root.join("bin")).unwrap();
    fs::create_dir_all(root.join("lib")).unwrap();
    fs::write(root.join("bin/ruby"), "#!/bin/sh\n").unwrap();
    let mut perms = fs::metadata(root.join("bin/ruby")).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(root.join("bin/ruby"), perms).unwrap();
    fs::write(root.join("lib/libruby.3.4.so"), "so").unwrap();
    std::os::unix::fs::symlink("libruby.3.4.so", root.join("lib/libruby.so")).unwrap();

    bench.archive_staging(
        "jdx-ruby@3.4.5--3.4.5.arm64_sequoia.bottle.tar.gz",
        staging.path(),
        "jdx-ruby@3.4.5",
    );

    repack::repackage_bottles(
        &variant::JDX,
        "jdx-ruby@3.4.5",
        false,
        &bench.work,
        &bench.cellar,
    )
    .unwrap();

    let tree = bench.extract("ruby-3.4.5.macos.bottle.tar.gz");
    let root = tree.join("ruby-3.4.5");

    let mode = fs::metadata(root.join("bin/ruby")).unwrap().permissions().mode();
    assert_ne!(mode & 0o111, 0, "executable bit lost: {mode:o}");

    let link = fs::symlink_metadata(root.join("lib/libruby.so")).unwrap();
    assert!(link.file_type().is_symlink());
    assert_eq!(
        fs::read_link(root.join("lib/libruby.so")).unwrap(),
        PathBuf::from("libruby.3.4.so")
    );
}
