//! Address handling: parsing, canonical rewriting, and table mapping.

pub mod map;
pub mod parse;
pub mod rewrite;

pub use map::{map_one_to_many, map_one_to_one, Expansion, HashMapTable, LookupTable};
pub use rewrite::{masquerade, rewrite_address, DomainRewriter, RewriteContext, Rewriter};
