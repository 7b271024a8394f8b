pub mod filter_map;
pub mod matcher;

pub use filter_map::{FilterMap, FilterSet};
pub use matcher::{clauses_pass, is_filter_match, MatchMode};

/// Pseudo-key injected into a source's filter data before matching.
pub const SOURCE_TYPE_KEY: &str = "source_type";
