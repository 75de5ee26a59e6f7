#![deny(missing_docs)]
//! Log entry data model for lumber.
//!
//! Defines [`Entry`] (the in-flight log record), [`Field`] (a path language
//! for addressing values inside an entry), and [`Severity`]. Entries are
//! created by input operators and flow through the pipeline by value; one
//! operator owns an entry at any moment.

mod entry;
mod field;
mod severity;

pub use entry::Entry;
pub use field::{Field, FieldError};
pub use severity::{Severity, UnknownSeverity};

/// The dynamic value stored in an entry's record.
///
/// Maps preserve insertion order, which field addressing and serialized
/// output both rely on.
pub type Value = serde_json::Value;
