//! gvendor core library: domain types, YAML persistence, errors.
//!
//! - [`types`]: vendor config and lockfile structs
//! - [`config`]: `vendor.yml` / `vendor.lock` load / save
//! - [`settings`]: user-level defaults from `~/.gvendor/settings.yaml`
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod settings;
pub mod types;

pub use error::ConfigError;
pub use settings::Settings;
pub use types::{
    HookSpec, LockEntry, Lockfile, PathMapping, PositionLock, RefSpec, VendorConfig, VendorName,
    VendorSpec,
};
