//! Library interface for portabru
//!
//! Exposes the bottling pipeline's pieces for integration testing and
//! potential embedding.

pub mod brew;
pub mod build;
pub mod cellar;
pub mod commands;
pub mod error;
pub mod platform;
pub mod rename;
pub mod repack;
pub mod resolver;
pub mod variant;

// Re-export the types most callers touch
pub use brew::{BrewClient, DependencyEdge, FormulaInfo};
pub use error::{PortabruError, Result};
pub use rename::RenameRules;
pub use repack::{RepackOutcome, RepackReport};
pub use resolver::{ResolvedDeps, Resolver, Visit};
pub use variant::VariantConfig;
