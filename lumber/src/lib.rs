#![deny(missing_docs)]
//! # lumber — umbrella crate
//!
//! A pipeline-based log agent: operators ingest entries from
//! heterogeneous sources, transform and enrich them through a
//! user-configured graph, and ship them to sinks with buffering and
//! retry. This crate re-exports the member crates and provides the
//! assembled builtin registry.

pub use lumber_builtin;
pub use lumber_entry;
pub use lumber_operator;
pub use lumber_pipeline;

use lumber_operator::{BuildError, Registry};

/// A registry holding every builtin operator type.
pub fn default_registry() -> Result<Registry, BuildError> {
    let mut registry = Registry::new();
    lumber_builtin::register_all(&mut registry)?;
    Ok(registry)
}

/// Happy-path imports for embedding the engine.
pub mod prelude {
    pub use lumber_entry::{Entry, Field, Severity, Value};
    pub use lumber_operator::{
        Buffer, BufferConfig, BuildContext, Clearer, Flusher, FlusherConfig, MemoryBuffer,
        Operator, OperatorBuilder, Registry,
    };
    pub use lumber_pipeline::{
        Config, ConfigError, Pipeline, PluginRegistry, load_config, parse_config,
    };

    pub use crate::default_registry;
}
