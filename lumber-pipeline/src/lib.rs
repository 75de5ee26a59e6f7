#![deny(missing_docs)]
//! Pipeline engine for lumber.
//!
//! Turns a declarative node list ([`Config`]) into a validated,
//! runnable [`Pipeline`]: expansion of custom templates
//! ([`PluginRegistry`]), operator construction through the builtin
//! registry, default wiring, edge resolution, cycle detection, ordered
//! lifecycle, and DOT export.

pub mod config;
pub mod error;
pub mod loader;
pub mod params;
pub mod pipeline;
pub mod plugin;

pub use error::{ConfigError, PipelineError, StopError};
pub use loader::{expand_env, load_config, parse_config};
pub use params::{Config, Params};
pub use pipeline::Pipeline;
pub use plugin::{PluginRegistry, PluginTemplate};
