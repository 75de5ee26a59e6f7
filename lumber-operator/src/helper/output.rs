//! The output archetype: a consumer with no downstream.

use serde::Deserialize;

use crate::error::BuildError;
use crate::helper::{BasicConfig, BasicOperator};

/// Configuration shared by output operators.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Identity fields.
    #[serde(flatten)]
    pub basic: BasicConfig,
}

impl OutputConfig {
    /// The node's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.basic.id
    }

    /// The node's type.
    #[must_use]
    pub fn operator_type(&self) -> &str {
        &self.basic.operator_type
    }

    /// Move the node into `namespace`.
    pub fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
        self.basic.set_namespace(namespace, exclusions);
    }

    /// Build the output half of the runtime operator.
    pub fn build(&self) -> Result<OutputOperator, BuildError> {
        Ok(OutputOperator {
            basic: self.basic.build()?,
        })
    }
}

/// Runtime half shared by output operators.
#[derive(Debug, Clone)]
pub struct OutputOperator {
    basic: BasicOperator,
}

impl OutputOperator {
    /// The operator's id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.basic.id()
    }

    /// The operator's type.
    #[must_use]
    pub fn operator_type(&self) -> &str {
        self.basic.operator_type()
    }

    /// Outputs cannot be assigned to an output operator.
    pub fn refuse_outputs(&self) -> Result<(), BuildError> {
        Err(BuildError::CannotOutput {
            id: self.id().to_string(),
        })
    }
}
