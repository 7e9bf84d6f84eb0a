//! Category resolution: labels, vocabulary, normalization, caching and the
//! provider fallback chain.

pub mod cache;
pub mod chain;
pub mod label;
pub mod normalizer;
pub mod vocabulary;

pub use cache::CategoryCache;
pub use chain::{Categorization, CategorySource, ProviderChain, ProviderStats, ProviderStatsEntry};
pub use label::CategoryLabel;
pub use normalizer::CategoryNormalizer;
pub use vocabulary::{CategoryDef, CategoryVocabulary};
