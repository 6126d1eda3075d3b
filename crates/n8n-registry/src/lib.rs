//! Version catalog for the managed image
//!
//! Lists the releases published to the image registry, filtered down to
//! stable semantic versions and marked with the release the project itself
//! flags as latest.

pub mod api;
pub mod catalog;

pub use api::{HttpRegistry, RegistryApi, Release, TagPage, TagRecord};
pub use catalog::VersionCatalog;
