//! Dependency resolution with variant-aware pruning.
//!
//! Walks a formula's dependency graph through the catalog and splits the
//! result into two disjoint lists: dependencies installable as prebuilt
//! bottles and dependencies that must be built from source. Allowlisted
//! dependencies are kept as leaves, so nothing below them is visited; their
//! prebuilt binaries already contain whatever they need.

use std::collections::HashSet;

use crate::brew::{BrewClient, DependencyEdge};
use crate::error::Result;
use crate::variant::VariantConfig;

/// Decision for one dependency edge during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Drop the edge and do not look at the dependency's own deps.
    Exclude,
    /// Keep the dependency but treat it as self-contained.
    KeepLeaf,
    /// Keep the dependency and expand its deps too.
    Recurse,
}

/// Resolved dependency sets for one formula. The lists are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDeps {
    /// Installable as prebuilt bottles.
    pub bottled: Vec<String>,
    /// Must be built from source before the target.
    pub source: Vec<String>,
}

/// Expand `root`'s dependency graph, deciding each edge via `visit`.
///
/// Returns the kept dependency names in encounter order, deduplicated. The
/// root itself is not part of the output. `lookup` supplies the direct
/// dependency edges of any formula; it is only called for formulae a
/// `Recurse` decision reaches, so allowlisted leaves never cost a catalog
/// query.
pub fn expand_dependencies<L, V>(root: &str, mut lookup: L, mut visit: V) -> Result<Vec<String>>
where
    L: FnMut(&str) -> Result<Vec<DependencyEdge>>,
    V: FnMut(&DependencyEdge) -> Visit,
{
    let mut kept: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut expanded: HashSet<String> = HashSet::new();
    let mut pending: Vec<String> = vec![root.to_string()];

    while let Some(current) = pending.pop() {
        if !expanded.insert(current.clone()) {
            continue;
        }

        for edge in lookup(&current)? {
            match visit(&edge) {
                Visit::Exclude => {}
                Visit::KeepLeaf => {
                    if seen.insert(edge.name.clone()) {
                        kept.push(edge.name);
                    }
                }
                Visit::Recurse => {
                    if seen.insert(edge.name.clone()) {
                        kept.push(edge.name.clone());
                    }
                    pending.push(edge.name);
                }
            }
        }
    }

    Ok(kept)
}

/// Resolver with per-process memoization of resolved dependency sets.
pub struct Resolver {
    cache: moka::sync::Cache<String, ResolvedDeps>,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            cache: moka::sync::Cache::new(64),
        }
    }

    /// Resolve a formula's dependency sets through the external catalog.
    pub fn resolve(
        &self,
        brew: &BrewClient,
        variant: &VariantConfig,
        formula: &str,
        no_yjit: bool,
        cache_key: &str,
    ) -> Result<ResolvedDeps> {
        self.resolve_with(
            |name| brew.info(name).map(|f| f.direct_dependencies()),
            variant,
            formula,
            no_yjit,
            cache_key,
        )
    }

    /// Resolve against an arbitrary edge source. Memoized by `cache_key`.
    pub fn resolve_with<L>(
        &self,
        lookup: L,
        variant: &VariantConfig,
        formula: &str,
        no_yjit: bool,
        cache_key: &str,
    ) -> Result<ResolvedDeps>
    where
        L: FnMut(&str) -> Result<Vec<DependencyEdge>>,
    {
        if let Some(hit) = self.cache.get(cache_key) {
            return Ok(hit);
        }

        let kept = expand_dependencies(formula, lookup, |edge| {
            if edge.test_only || edge.optional {
                return Visit::Exclude;
            }
            if no_yjit && variant.yjit_toolchain_dep == Some(edge.name.as_str()) {
                return Visit::Exclude;
            }
            if variant.matches_allowlist(&edge.name) {
                return Visit::KeepLeaf;
            }
            Visit::Recurse
        })?;

        let (bottled, source) = kept
            .into_iter()
            .partition(|name| variant.matches_allowlist(name));
        let resolved = ResolvedDeps { bottled, source };

        self.cache.insert(cache_key.to_string(), resolved.clone());
        Ok(resolved)
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}
