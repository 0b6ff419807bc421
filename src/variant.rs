//! Pipeline variants.
//!
//! Both pipelines build the same product (a portable Ruby) from differently
//! named formula families and publish to different roots. Everything that
//! differs between them lives in one [`VariantConfig`] so the resolver, build
//! driver, and repackager stay variant-agnostic.

/// A portable dependency whose headers get vendored into the final archive.
#[derive(Debug, Clone, Copy)]
pub struct HeaderDep {
    /// Formula name prefix to look up in the Cellar.
    pub prefix: &'static str,
    /// Only injected when building on Linux.
    pub linux_only: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct VariantConfig {
    /// Short variant name, also the CLI subcommand.
    pub name: &'static str,
    /// Formula family prefix stripped from artifact and formula names.
    pub family_prefix: &'static str,
    /// Product prefix the stripped names are rewritten to.
    pub product: &'static str,
    /// Name prefixes of dependencies installable as prebuilt bottles.
    pub allowlist: &'static [&'static str],
    /// Root URL recorded in the bottle metadata for later upload.
    pub root_url: &'static str,
    /// Headers vendored into the repackaged archive.
    pub header_deps: &'static [HeaderDep],
    /// Build flag appended to the target install when YJIT is disabled.
    pub yjit_build_flag: &'static str,
    /// Toolchain dependency that becomes dead weight without YJIT and is
    /// pruned from resolution, matched by exact name.
    pub yjit_toolchain_dep: Option<&'static str>,
}

pub static JDX: VariantConfig = VariantConfig {
    name: "jdx",
    family_prefix: "jdx-",
    product: "ruby",
    allowlist: &[
        "glibc@",
        "linux-headers@",
        "rustup",
        "autoconf",
        "bison",
        "m4",
        "pkgconf",
    ],
    root_url: "https://github.com/jdx/portable-ruby/releases/download",
    header_deps: &[
        HeaderDep {
            prefix: "portable-openssl",
            linux_only: false,
        },
        HeaderDep {
            prefix: "portable-libyaml",
            linux_only: false,
        },
        HeaderDep {
            prefix: "portable-libffi",
            linux_only: true,
        },
        HeaderDep {
            prefix: "portable-zlib",
            linux_only: true,
        },
        HeaderDep {
            prefix: "portable-libxcrypt",
            linux_only: true,
        },
    ],
    yjit_build_flag: "--without-yjit",
    yjit_toolchain_dep: Some("rustup"),
};

pub static PORTABLE: VariantConfig = VariantConfig {
    name: "portable",
    family_prefix: "portable-",
    product: "ruby",
    allowlist: &[
        "glibc@",
        "linux-headers@",
        "autoconf",
        "bison",
        "m4",
        "pkgconf",
    ],
    root_url: "https://github.com/Homebrew/homebrew-portable-ruby/releases/download",
    header_deps: &[],
    yjit_build_flag: "--without-yjit",
    yjit_toolchain_dep: None,
};

impl VariantConfig {
    /// Whether a dependency can be installed from a prebuilt bottle.
    pub fn matches_allowlist(&self, name: &str) -> bool {
        self.allowlist.iter().any(|prefix| name.starts_with(prefix))
    }

    /// Consumer-facing name for a formula: the family prefix is dropped and a
    /// `-dev` suffix becomes a `@dev` version pin.
    ///
    /// `jdx-ruby@3.4.5` -> `ruby@3.4.5`, `portable-ruby-dev` -> `ruby@dev`.
    pub fn product_name(&self, formula: &str) -> String {
        let name = formula.strip_prefix(self.family_prefix).unwrap_or(formula);
        match name.strip_suffix("-dev") {
            Some(base) => format!("{base}@dev"),
            None => name.to_string(),
        }
    }
}
