//! Error types for config resolution and pipeline lifecycle.

use std::fmt;
use std::path::PathBuf;

use lumber_operator::error::{BuildError, OperatorError};

/// A fatal problem turning declarative configuration into a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An operator factory rejected its configuration.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Two expanded nodes share an id.
    #[error("duplicate operator id `{0}`")]
    DuplicateId(String),

    /// The pipeline has no nodes.
    #[error("pipeline configuration is empty")]
    Empty,

    /// A node that sends entries downstream terminates the pipeline.
    #[error(
        "operator `{id}` terminates the pipeline but is not an output operator; \
         declare an `output` for it or end the pipeline with an output"
    )]
    MissingTerminal {
        /// The offending operator's id.
        id: String,
    },

    /// The operator graph contains a cycle.
    #[error("pipeline contains a cycle through: {0}")]
    Cycle(String),

    /// A plugin template is malformed or was rendered with bad
    /// parameters.
    #[error("template `{name}`: {message}")]
    Template {
        /// The template's name.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// Custom templates expand through each other past the depth bound.
    #[error("template expansion exceeded the nesting limit at `{0}`")]
    RecursionLimit(String),

    /// A config file could not be read.
    #[error("failed to read `{path}`: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A config or template file is not valid YAML.
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A failed pipeline start.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// `start` was called on a pipeline that is already running.
    #[error("pipeline already started")]
    AlreadyStarted,

    /// `start` was called after `stop`.
    #[error("pipeline has been stopped")]
    Stopped,

    /// An operator failed to start; already-started operators were
    /// stopped again.
    #[error(transparent)]
    Operator(#[from] OperatorError),
}

/// The aggregate of operator failures from a best-effort stop.
///
/// Cloneable so a second `stop` call can return the same result without
/// doing any work.
#[derive(Debug, Clone)]
pub struct StopError {
    /// Every operator failure encountered, in stop order.
    pub failures: Vec<OperatorError>,
}

impl std::error::Error for StopError {}

impl fmt::Display for StopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} operator(s) failed to stop: ", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}
