//! Error types shared by the operator crates.

use std::fmt;

/// Errors constructing an operator from its declarative configuration.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The node's `type` is not registered, builtin or custom.
    #[error("unknown operator type `{0}`")]
    UnknownType(String),

    /// Two factories were registered under the same type name.
    #[error("operator type `{0}` registered twice")]
    DuplicateType(String),

    /// A required parameter is missing or has a bad value.
    #[error("invalid configuration for operator `{id}`: {message}")]
    InvalidConfig {
        /// The offending operator's id.
        id: String,
        /// What was wrong with it.
        message: String,
    },

    /// The node map could not be deserialized into the operator's config.
    #[error("failed to read `{operator_type}` configuration: {source}")]
    Deserialize {
        /// The operator type being configured.
        operator_type: String,
        /// The underlying deserialization failure.
        #[source]
        source: serde_yaml::Error,
    },

    /// An output reference does not name a built operator.
    #[error("operator `{id}` references undefined output `{output}`")]
    MissingOutput {
        /// The operator holding the dangling reference.
        id: String,
        /// The reference that did not resolve.
        output: String,
    },

    /// Outputs were assigned to an operator that cannot have any.
    #[error("operator `{id}` cannot be assigned outputs")]
    CannotOutput {
        /// The operator's id.
        id: String,
    },

    /// Outputs were assigned twice to the same operator.
    #[error("outputs already resolved for operator `{id}`")]
    OutputsAlreadySet {
        /// The operator's id.
        id: String,
    },
}

/// Errors from operator lifecycle transitions.
///
/// Carries only the operator's identity and a message, so pipeline-level
/// aggregates stay cheap to clone and free of entry payloads.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OperatorError {
    /// The operator failed to start.
    #[error("operator `{id}` failed to start: {message}")]
    StartFailed {
        /// The operator's id.
        id: String,
        /// Why it failed.
        message: String,
    },

    /// The operator failed to stop cleanly.
    #[error("operator `{id}` failed to stop: {message}")]
    StopFailed {
        /// The operator's id.
        id: String,
        /// Why it failed.
        message: String,
    },
}

/// Errors from processing a single entry.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// `process` was called on an operator that cannot process.
    #[error("operator `{id}` does not process entries")]
    NotSupported {
        /// The operator's id.
        id: String,
    },

    /// The entry does not have the expected `parse_from` field.
    #[error("entry is missing the expected parse_from field `{field}`")]
    MissingField {
        /// The field that was absent.
        field: String,
    },

    /// The parse function rejected the input value.
    #[error("failed to parse entry: {message}")]
    ParseFailed {
        /// Why the value could not be parsed.
        message: String,
    },

    /// One or both sub-parsers failed; successful writes were kept.
    #[error("{0}")]
    SubParsers(SubParserErrors),

    /// The output's buffer rejected the entry.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Joined failures from the independent time and severity sub-parsers.
///
/// The two sub-parsers always both run; this type carries whichever of
/// them failed.
#[derive(Debug, Default)]
pub struct SubParserErrors {
    /// The time sub-parser's failure, if any.
    pub time: Option<crate::timestamp::TimeParseError>,
    /// The severity sub-parser's failure, if any.
    pub severity: Option<crate::severity::SeverityParseError>,
}

impl SubParserErrors {
    /// Whether either sub-parser failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.severity.is_none()
    }
}

impl fmt::Display for SubParserErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if let Some(err) = &self.time {
            write!(f, "time parser: {err}")?;
            first = false;
        }
        if let Some(err) = &self.severity {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "severity parser: {err}")?;
        }
        Ok(())
    }
}

/// Errors from buffer operations.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// The wait was cancelled before it could complete.
    #[error("buffer operation cancelled")]
    Cancelled,

    /// A clearer was asked to flush a range outside its chunk.
    #[error("flush range [{lo}, {hi}) outside chunk of length {len}")]
    InvalidRange {
        /// Inclusive lower bound of the requested range.
        lo: usize,
        /// Exclusive upper bound of the requested range.
        hi: usize,
        /// The chunk's length.
        len: usize,
    },
}

/// A failed flush attempt.
///
/// The flusher retries any error until the thunk succeeds or the flusher
/// is stopped; classification of retriable vs. permanent failures is the
/// thunk's responsibility.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct FlushError {
    message: String,
}

impl FlushError {
    /// A flush error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for FlushError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for FlushError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}
