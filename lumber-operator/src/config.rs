//! Declarative configuration machinery: builders, registry, namespacing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::BuildError;
use crate::operator::Operator;

/// Context handed to every builder.
///
/// Carries the pipeline's root cancellation token; operators that own
/// background tasks derive child tokens from it so that pipeline stop
/// propagates to every producer, buffer wait, and in-flight request.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    /// The pipeline's root cancellation token.
    pub cancellation: CancellationToken,
}

impl BuildContext {
    /// A build context with a fresh root token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// A declarative operator node, validated and ready to build.
///
/// Builders are produced by the [`Registry`] from raw config nodes, may
/// be renamed into a template's namespace, and are instantiated exactly
/// once into a runtime [`Operator`].
pub trait OperatorBuilder: Send {
    /// The node's id (namespaced once expansion has run).
    fn id(&self) -> &str;

    /// The node's registered type.
    fn operator_type(&self) -> &str;

    /// The declared downstream ids, namespaced along with the node.
    fn output_ids(&self) -> Vec<String>;

    /// Prefix the node's id and its output references with `namespace`.
    /// References listed in `exclusions` are left untouched; they point
    /// outside the namespace.
    fn set_namespace(&mut self, namespace: &str, exclusions: &[String]);

    /// Instantiate the runtime operator.
    fn build(&self, context: &BuildContext) -> Result<Arc<dyn Operator>, BuildError>;
}

/// Prefix `id` with `namespace` unless it is excluded or already inside.
#[must_use]
pub fn add_namespace(id: &str, namespace: &str, exclusions: &[String]) -> String {
    if namespace.is_empty() || exclusions.iter().any(|e| e == id) {
        return id.to_string();
    }
    if id == namespace || id.starts_with(&format!("{namespace}.")) {
        return id.to_string();
    }
    format!("{namespace}.{id}")
}

type BuilderFactory =
    Box<dyn Fn(serde_yaml::Value) -> Result<Box<dyn OperatorBuilder>, BuildError> + Send + Sync>;

/// Catalog of builtin operator factories, keyed by type name.
///
/// The registry is instance-based: there is no global registration, and
/// the full builtin set is assembled by the caller (the umbrella crate's
/// `default_registry`). Registering the same type twice is an error.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, BuilderFactory>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a config type under `operator_type`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::DuplicateType`] if the type name is taken.
    pub fn register<T>(&mut self, operator_type: &str) -> Result<(), BuildError>
    where
        T: OperatorBuilder + DeserializeOwned + 'static,
    {
        if self.factories.contains_key(operator_type) {
            return Err(BuildError::DuplicateType(operator_type.to_string()));
        }
        let name = operator_type.to_string();
        self.factories.insert(
            operator_type.to_string(),
            Box::new(move |node| {
                let config: T =
                    serde_yaml::from_value(node).map_err(|source| BuildError::Deserialize {
                        operator_type: name.clone(),
                        source,
                    })?;
                Ok(Box::new(config))
            }),
        );
        Ok(())
    }

    /// Whether `operator_type` is registered.
    #[must_use]
    pub fn contains(&self, operator_type: &str) -> bool {
        self.factories.contains_key(operator_type)
    }

    /// Deserialize a raw config node into the builder for its type.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnknownType`] for unregistered types and
    /// [`BuildError::Deserialize`] when the node does not match the
    /// type's configuration.
    pub fn create(
        &self,
        operator_type: &str,
        node: serde_yaml::Value,
    ) -> Result<Box<dyn OperatorBuilder>, BuildError> {
        let factory = self
            .factories
            .get(operator_type)
            .ok_or_else(|| BuildError::UnknownType(operator_type.to_string()))?;
        factory(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::OutputConfig;
    use serde::Deserialize;

    #[derive(Debug, Clone, Deserialize)]
    struct MiniConfig {
        #[serde(flatten)]
        output: OutputConfig,
    }

    impl OperatorBuilder for MiniConfig {
        fn id(&self) -> &str {
            self.output.id()
        }
        fn operator_type(&self) -> &str {
            self.output.operator_type()
        }
        fn output_ids(&self) -> Vec<String> {
            Vec::new()
        }
        fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
            self.output.set_namespace(namespace, exclusions);
        }
        fn build(&self, _context: &BuildContext) -> Result<Arc<dyn Operator>, BuildError> {
            Err(BuildError::InvalidConfig {
                id: self.id().to_string(),
                message: "mini operators never build".to_string(),
            })
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = Registry::new();
        registry.register::<MiniConfig>("mini").expect("first");
        let err = registry.register::<MiniConfig>("mini").unwrap_err();
        assert!(matches!(err, BuildError::DuplicateType(t) if t == "mini"));
    }

    #[test]
    fn create_resolves_registered_types_only() {
        let mut registry = Registry::new();
        registry.register::<MiniConfig>("mini").expect("registers");
        assert!(registry.contains("mini"));

        let node: serde_yaml::Value =
            serde_yaml::from_str("{id: x, type: mini}").expect("valid node");
        let builder = registry.create("mini", node).expect("creates");
        assert_eq!(builder.id(), "x");

        let err = registry
            .create("missing", serde_yaml::Value::Null)
            .err()
            .expect("should fail to create");
        assert!(matches!(err, BuildError::UnknownType(t) if t == "missing"));
    }

    #[test]
    fn malformed_node_is_a_deserialize_error() {
        let mut registry = Registry::new();
        registry.register::<MiniConfig>("mini").expect("registers");
        // `id` must be a string.
        let node: serde_yaml::Value =
            serde_yaml::from_str("{id: [1, 2], type: mini}").expect("valid yaml");
        let err = registry.create("mini", node).err().expect("should fail to create");
        assert!(matches!(err, BuildError::Deserialize { .. }));
    }

    #[test]
    fn add_namespace_rules() {
        let none: Vec<String> = vec![];
        assert_eq!(add_namespace("n1", "a", &none), "a.n1");
        assert_eq!(add_namespace("n1", "", &none), "n1");
        assert_eq!(add_namespace("a.n1", "a", &none), "a.n1");
        assert_eq!(add_namespace("a", "a", &none), "a");
        let excl = vec!["out".to_string()];
        assert_eq!(add_namespace("out", "a", &excl), "out");
    }
}
