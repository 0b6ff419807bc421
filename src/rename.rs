//! Ordered rename rules for bottle artifacts.
//!
//! Homebrew names bottles `<formula>--<version>.<tag>.bottle.{json,tar.gz}`.
//! The consumer-facing scheme is `ruby-<version>[...]`, so one ordered rule
//! table rewrites formula prefixes, HEAD commit fragments, platform tags, and
//! the YJIT marker. The same table is applied to filenames and to serialized
//! JSON text, which keeps a metadata file and its tarball correlated. The one
//! sanctioned divergence is the HEAD fragment: metadata drops it (the commit
//! moves into the version field), tarballs keep a generic `-dev` marker.

use anyhow::Context;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::Result;
use crate::platform;
use crate::variant::VariantConfig;

fn head_fragment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-HEAD-([0-9a-f]+)").expect("hard-coded pattern"))
}

/// Pull the commit hash out of a `-HEAD-<hash>` filename fragment.
pub fn extract_head_commit(name: &str) -> Option<String> {
    head_fragment()
        .captures(name)
        .map(|caps| caps[1].to_string())
}

/// Percent-encode the characters Homebrew encodes in bottle URLs.
fn url_encode(name: &str) -> String {
    name.replace('@', "%40")
}

/// An ordered list of `(pattern, replacement)` substitutions.
pub struct RenameRules {
    rules: Vec<(Regex, String)>,
}

impl RenameRules {
    /// Rules for bottle metadata: filenames and JSON text. The HEAD fragment
    /// is dropped entirely.
    pub fn for_json(variant: &VariantConfig, formula: &str, no_yjit: bool) -> Result<Self> {
        Self::build(variant, formula, no_yjit, "")
    }

    /// Rules for tarball filenames. The HEAD fragment becomes `-dev`.
    pub fn for_tarball(variant: &VariantConfig, formula: &str, no_yjit: bool) -> Result<Self> {
        Self::build(variant, formula, no_yjit, "-dev")
    }

    fn build(
        variant: &VariantConfig,
        formula: &str,
        no_yjit: bool,
        head_replacement: &str,
    ) -> Result<Self> {
        let product = variant.product;
        let encoded = url_encode(formula);
        let platform_tag = format!(
            "({})_({})",
            platform::ARCHES.join("|"),
            platform::MACOS_RELEASES.join("|")
        );

        let mut table: Vec<(String, String)> = vec![
            (
                format!("{}--", regex::escape(formula)),
                format!("{product}-"),
            ),
            (
                head_fragment().as_str().to_string(),
                head_replacement.to_string(),
            ),
            (platform_tag, platform::GENERIC_MACOS.to_string()),
        ];

        if no_yjit {
            table.push((r"\.bottle\.".to_string(), ".no_yjit.".to_string()));
        }

        // URL-encoded occurrences, e.g. in recorded bottle URLs.
        table.push((
            format!("{}--", regex::escape(&encoded)),
            format!("{product}-"),
        ));
        table.push((regex::escape(&encoded), product.to_string()));

        let rules = table
            .into_iter()
            .map(|(pattern, replacement)| {
                let re = Regex::new(&pattern)
                    .with_context(|| format!("Invalid rename pattern: {pattern}"))?;
                Ok((re, replacement))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Apply every rule in order.
    pub fn apply(&self, input: &str) -> String {
        self.rules.iter().fold(input.to_string(), |text, (re, replacement)| {
            re.replace_all(&text, replacement.as_str()).into_owned()
        })
    }
}
