// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - [`model`] holds the raw (serde) and validated shapes.
//! - [`loader`] reads TOML from disk.
//! - [`validate`] turns a raw file into a [`ConfigFile`].
//! - [`duration`] parses the `<n>ms|s|m|h` duration grammar.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_or_default};
pub use model::{ConfigFile, JournalSection, RawConfigFile};
