//! On-disk state: the HTTP validator cache and the article store.
//!
//! Both files load independently. A missing or corrupt file only resets its
//! own half of the state.

pub mod articles;
pub mod http_meta;
pub mod persist;

pub use articles::{ArticleStore, MergeResult};
pub use http_meta::HttpMetadataCache;
