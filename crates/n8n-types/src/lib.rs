//! Common types shared across the n8n manager crates
//!
//! This crate holds the data model, the error taxonomy, configuration and
//! the semantic-version policy so the engine and registry crates do not
//! depend on each other.

pub mod config;
pub mod container;
pub mod error;
pub mod version;

pub use config::*;
pub use container::*;
pub use error::*;
pub use version::*;
