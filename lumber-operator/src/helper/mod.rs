//! Archetype helpers composed by concrete operators.
//!
//! Each helper comes as a pair: a serde-deserializable `*Config` embedded
//! (flattened) in the concrete operator's configuration, and the runtime
//! half it builds. Concrete operators embed the helper that matches
//! their archetype and delegate the boilerplate half of the [`Operator`]
//! trait to it.
//!
//! [`Operator`]: crate::operator::Operator

mod input;
mod output;
mod parser;
mod transformer;
mod writer;

pub use input::{InputConfig, InputOperator};
pub use output::{OutputConfig, OutputOperator};
pub use parser::{ParserConfig, ParserOperator};
pub use transformer::{OnError, TransformerConfig, TransformerOperator};
pub use writer::{WriterConfig, WriterOperator};

use serde::Deserialize;

use crate::config::add_namespace;
use crate::error::BuildError;

/// The fields every operator node shares: `id` and `type`.
#[derive(Debug, Clone, Deserialize)]
pub struct BasicConfig {
    /// Unique id within the node's namespace.
    pub id: String,
    /// The registered operator type.
    #[serde(rename = "type")]
    pub operator_type: String,
}

impl BasicConfig {
    /// Check that both required fields are present and non-empty.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.id.is_empty() {
            return Err(BuildError::InvalidConfig {
                id: self.operator_type.clone(),
                message: "missing required `id` field".to_string(),
            });
        }
        if self.operator_type.is_empty() {
            return Err(BuildError::InvalidConfig {
                id: self.id.clone(),
                message: "missing required `type` field".to_string(),
            });
        }
        Ok(())
    }

    /// Move the node into `namespace`.
    pub fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
        self.id = add_namespace(&self.id, namespace, exclusions);
    }

    /// Build the identity half of the runtime operator.
    pub fn build(&self) -> Result<BasicOperator, BuildError> {
        self.validate()?;
        Ok(BasicOperator {
            id: self.id.clone(),
            operator_type: self.operator_type.clone(),
        })
    }
}

/// Runtime identity shared by every operator.
#[derive(Debug, Clone)]
pub struct BasicOperator {
    id: String,
    operator_type: String,
}

impl BasicOperator {
    /// The operator's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The operator's type.
    #[must_use]
    pub fn operator_type(&self) -> &str {
        &self.operator_type
    }
}
