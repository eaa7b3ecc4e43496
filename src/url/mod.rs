//! URL handling module for Sumi-Audit
//!
//! Normalization here is deliberately light: the audit rules need to see URLs
//! the way the site publishes them (case, trailing slashes, query strings), so
//! only the fragment is dropped for deduplication.

mod domain;
mod normalize;

pub use domain::{extract_domain, is_in_scope, matches_wildcard};
pub use normalize::{normalize_url, resolve_link};
