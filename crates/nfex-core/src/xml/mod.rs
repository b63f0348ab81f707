//! Namespace-aware XML element tree.
//!
//! The NF-e extractor needs a handful of lookups (direct child, chained
//! child path, depth-first descendant) over a small document, so the whole
//! input is materialized as an owned tree of [`Element`]s.
//!
//! [`write_revised`] goes the other way and renders an extraction as XML.

mod revised;
mod tree;

pub use revised::{tag_name, write_revised};
pub use tree::{Document, Element};
