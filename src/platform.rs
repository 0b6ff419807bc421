//! Platform tag vocabulary for bottle artifacts.
//!
//! Homebrew names bottles with `<arch>_<os>` tags like `arm64_sequoia` or
//! `x86_64_linux`. Portable interpreters are self-contained, so a bottle built
//! on any supported macOS release runs on all of them. The repackager collapses
//! macOS release tags down to a generic `macos` tag; Linux tags already encode
//! nothing release-specific and pass through unchanged.

/// macOS release names that can appear in a bottle tag, newest first.
pub const MACOS_RELEASES: &[&str] = &[
    "tahoe",    // macOS 26 / 16
    "sequoia",  // macOS 15
    "sonoma",   // macOS 14
    "ventura",  // macOS 13
    "monterey", // macOS 12
    "big_sur",  // macOS 11
];

/// Architectures Homebrew ships bottles for.
pub const ARCHES: &[&str] = &["arm64", "x86_64"];

/// The release-independent tag portable macOS bottles are renamed to.
pub const GENERIC_MACOS: &str = "macos";

/// Whether the build host is Linux. Decides if Linux-only header
/// dependencies get vendored into the archive.
pub fn on_linux() -> bool {
    cfg!(target_os = "linux")
}
