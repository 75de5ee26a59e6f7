//! Custom operator templates: parameterized sub-pipelines.
//!
//! A template file declares `parameters` and a `pipeline` body whose
//! values may contain `{{.param}}` placeholders. Rendering validates
//! the invoking node's parameters against the declarations, substitutes
//! them as YAML scalars, and parses the result into a node list. The
//! file stem is the template's type name.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;

use crate::error::ConfigError;
use crate::params::Params;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern compiles")
});

/// The declared type of a template parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// A string scalar.
    #[default]
    String,
    /// An integer scalar.
    Int,
    /// A boolean scalar.
    Bool,
    /// A list of strings.
    Strings,
}

/// One declared template parameter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParameterDef {
    /// The parameter's type.
    #[serde(rename = "type", default)]
    pub kind: ParameterKind,
    /// Whether the invoking node must supply it.
    #[serde(default)]
    pub required: bool,
    /// The value used when the invoking node omits it.
    #[serde(default)]
    pub default: Option<Value>,
}

/// The declaration half of a template file, read with placeholders
/// neutralized.
#[derive(Debug, Deserialize)]
struct TemplateHeader {
    #[serde(default)]
    parameters: HashMap<String, ParameterDef>,
}

/// The rendered half of a template file.
#[derive(Debug, Deserialize)]
struct TemplateBody {
    pipeline: Vec<Params>,
}

/// A loaded template.
#[derive(Debug, Clone)]
pub struct PluginTemplate {
    name: String,
    parameters: HashMap<String, ParameterDef>,
    /// The raw file text; placeholders are substituted at render time.
    text: String,
}

impl PluginTemplate {
    /// Parse a template from its file text.
    pub fn parse(name: &str, text: &str) -> Result<Self, ConfigError> {
        // Neutralize placeholders so the declaration half parses.
        let neutralized = PLACEHOLDER.replace_all(text, "null");
        let header: TemplateHeader =
            serde_yaml::from_str(&neutralized).map_err(|err| ConfigError::Template {
                name: name.to_string(),
                message: format!("invalid template file: {err}"),
            })?;
        for captures in PLACEHOLDER.captures_iter(text) {
            let parameter = &captures[1];
            if !header.parameters.contains_key(parameter) {
                return Err(ConfigError::Template {
                    name: name.to_string(),
                    message: format!("placeholder `{{{{.{parameter}}}}}` is not a declared parameter"),
                });
            }
        }
        Ok(Self {
            name: name.to_string(),
            parameters: header.parameters,
            text: text.to_string(),
        })
    }

    /// The template's type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the template for one invoking node.
    ///
    /// Every declared parameter is taken from the node or its default;
    /// missing required parameters and type mismatches are errors.
    pub fn render(&self, node: &Params) -> Result<Vec<Params>, ConfigError> {
        let mut values: HashMap<&str, String> = HashMap::new();
        for (name, def) in &self.parameters {
            let value = match node.get(name).cloned().or_else(|| def.default.clone()) {
                Some(value) => value,
                None if def.required => {
                    return Err(self.error(format!("missing required parameter `{name}`")));
                }
                None => Value::Null,
            };
            values.insert(name.as_str(), self.encode(name, def.kind, &value)?);
        }

        let rendered = PLACEHOLDER.replace_all(&self.text, |captures: &regex::Captures<'_>| {
            values
                .get(&captures[1])
                .cloned()
                .unwrap_or_else(|| "null".to_string())
        });
        let body: TemplateBody =
            serde_yaml::from_str(&rendered).map_err(|err| self.error(format!(
                "rendered pipeline is not valid YAML: {err}"
            )))?;
        if body.pipeline.is_empty() {
            return Err(self.error("rendered pipeline is empty".to_string()));
        }
        Ok(body.pipeline)
    }

    /// Encode a parameter value as an inline YAML scalar.
    fn encode(&self, name: &str, kind: ParameterKind, value: &Value) -> Result<String, ConfigError> {
        if value.is_null() {
            return Ok("null".to_string());
        }
        let encoded = match (kind, value) {
            (ParameterKind::String, Value::String(_))
            | (ParameterKind::Int, Value::Number(_))
            | (ParameterKind::Bool, Value::Bool(_)) => encode_scalar(value),
            (ParameterKind::Strings, Value::Sequence(items)) => {
                let mut encoded = Vec::with_capacity(items.len());
                for item in items {
                    if !item.is_string() {
                        return Err(self.error(format!(
                            "parameter `{name}` must be a list of strings"
                        )));
                    }
                    match encode_scalar(item) {
                        Some(item) => encoded.push(item),
                        None => {
                            return Err(self.error(format!(
                                "parameter `{name}` does not match its declared type"
                            )))
                        }
                    }
                }
                Some(format!("[{}]", encoded.join(", ")))
            }
            _ => None,
        };
        encoded.ok_or_else(|| {
            self.error(format!(
                "parameter `{name}` does not match its declared type"
            ))
        })
    }

    fn error(&self, message: String) -> ConfigError {
        ConfigError::Template {
            name: self.name.clone(),
            message,
        }
    }
}

/// YAML-encode one scalar inline (quotes strings that need it).
fn encode_scalar(value: &Value) -> Option<String> {
    serde_yaml::to_string(value)
        .ok()
        .map(|text| text.trim_end().to_string())
}

/// The catalog of loaded templates, keyed by type name.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    templates: HashMap<String, PluginTemplate>,
}

impl PluginRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.yaml`/`*.yml` template in `dir`.
    ///
    /// A missing directory loads an empty registry; two files with the
    /// same stem are a fatal collision.
    pub fn load_dir(dir: &Path) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(registry),
            Err(err) => {
                return Err(ConfigError::Io {
                    path: dir.to_path_buf(),
                    source: err,
                });
            }
        };
        for entry in entries {
            let entry = entry.map_err(|err| ConfigError::Io {
                path: dir.to_path_buf(),
                source: err,
            })?;
            let path = entry.path();
            let is_template = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if !is_template {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(&path).map_err(|err| ConfigError::Io {
                path: path.clone(),
                source: err,
            })?;
            registry.add(name, &text)?;
            debug!(template = name, path = %path.display(), "loaded custom template");
        }
        Ok(registry)
    }

    /// Parse and register one template.
    pub fn add(&mut self, name: &str, text: &str) -> Result<(), ConfigError> {
        let template = PluginTemplate::parse(name, text)?;
        if self.templates.contains_key(name) {
            return Err(ConfigError::Template {
                name: name.to_string(),
                message: "defined twice".to_string(),
            });
        }
        self.templates.insert(name.to_string(), template);
        Ok(())
    }

    /// Whether `name` names a loaded template.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Look up a template by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PluginTemplate> {
        self.templates.get(name)
    }
}
