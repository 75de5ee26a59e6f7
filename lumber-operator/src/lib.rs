#![deny(missing_docs)]
//! Operator protocol for lumber.
//!
//! Defines the [`Operator`] trait (the polymorphic pipeline node), the
//! [`OperatorBuilder`]/[`Registry`] machinery that turns declarative
//! configuration into runtime operators, the archetype helpers that
//! concrete operators compose ([`helper`]), the time and severity
//! sub-parsers, and the output-side reliability layer ([`Buffer`] +
//! [`Flusher`]).

pub mod buffer;
pub mod config;
pub mod error;
pub mod flusher;
pub mod helper;
pub mod operator;
pub mod severity;
pub mod timestamp;

pub use buffer::{Buffer, BufferConfig, Clearer, MemoryBuffer};
pub use config::{BuildContext, OperatorBuilder, Registry, add_namespace};
pub use error::{
    BufferError, BuildError, FlushError, OperatorError, ProcessError, SubParserErrors,
};
pub use flusher::{Flusher, FlusherConfig};
pub use operator::Operator;
pub use severity::{SeverityParser, SeverityParserConfig};
pub use timestamp::{TimeParser, TimeParserConfig};
