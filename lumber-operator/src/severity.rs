//! The severity sub-parser: maps a raw field value onto the severity enum.

use std::collections::HashMap;

use lumber_entry::{Entry, Field, Severity, Value};
use serde::Deserialize;

use crate::error::BuildError;

/// A raw-value matcher in the severity mapping.
///
/// Mapping keys name severities; values give the raw inputs that map to
/// them — a scalar (string or number), a `{min, max}` range for numeric
/// inputs, or a list of either.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MappingValue {
    /// An inclusive numeric range.
    Range {
        /// Lowest matching number.
        min: i64,
        /// Highest matching number.
        max: i64,
    },
    /// Several matchers.
    List(Vec<MappingValue>),
    /// A single raw value: string (case-insensitive) or number.
    Scalar(Value),
}

/// Configuration of the severity sub-parser.
#[derive(Debug, Clone, Deserialize)]
pub struct SeverityParserConfig {
    /// The field holding the raw severity value.
    pub parse_from: Field,
    /// User mapping, merged over the standard alias table.
    #[serde(default)]
    pub mapping: HashMap<String, MappingValue>,
    /// Move the raw value here after a successful parse.
    #[serde(default)]
    pub preserve_to: Option<Field>,
}

impl SeverityParserConfig {
    /// Validate the mapping and build the runtime parser.
    pub fn build(&self, id: &str) -> Result<SeverityParser, BuildError> {
        let mut parser = SeverityParser {
            parse_from: self.parse_from.clone(),
            text: default_text_mapping(),
            numbers: HashMap::new(),
            ranges: Vec::new(),
            preserve_to: self.preserve_to.clone(),
        };
        for (name, matcher) in &self.mapping {
            let severity: Severity =
                name.parse().map_err(|_| BuildError::InvalidConfig {
                    id: id.to_string(),
                    message: format!("`{name}` is not a severity"),
                })?;
            parser.add_matcher(id, severity, matcher)?;
        }
        Ok(parser)
    }
}

/// The standard text table: every severity name and alias maps to itself.
fn default_text_mapping() -> HashMap<String, Severity> {
    let mut text = HashMap::new();
    for severity in [
        Severity::Default,
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Notice,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Alert,
        Severity::Emergency,
        Severity::Catastrophe,
    ] {
        text.insert(severity.as_str().to_string(), severity);
    }
    text.insert("warn".to_string(), Severity::Warning);
    text.insert("err".to_string(), Severity::Error);
    text.insert("crit".to_string(), Severity::Critical);
    text
}

/// Runtime severity sub-parser.
#[derive(Debug, Clone)]
pub struct SeverityParser {
    parse_from: Field,
    text: HashMap<String, Severity>,
    numbers: HashMap<i64, Severity>,
    ranges: Vec<(i64, i64, Severity)>,
    preserve_to: Option<Field>,
}

/// A severity sub-parser failure.
#[derive(Debug, thiserror::Error)]
pub enum SeverityParseError {
    /// The entry does not have the `parse_from` field.
    #[error("entry does not have the expected parse_from field `{0}`")]
    MissingField(String),

    /// The field's value is neither a string nor a number.
    #[error("severity value is not a string or number")]
    NotScalar,
}

impl SeverityParser {
    fn add_matcher(
        &mut self,
        id: &str,
        severity: Severity,
        matcher: &MappingValue,
    ) -> Result<(), BuildError> {
        match matcher {
            MappingValue::Range { min, max } => {
                self.ranges.push((*min.min(max), *min.max(max), severity));
            }
            MappingValue::List(matchers) => {
                for matcher in matchers {
                    self.add_matcher(id, severity, matcher)?;
                }
            }
            MappingValue::Scalar(Value::String(s)) => {
                self.text.insert(s.to_ascii_lowercase(), severity);
            }
            MappingValue::Scalar(Value::Number(n)) => {
                let value = n.as_i64().ok_or_else(|| BuildError::InvalidConfig {
                    id: id.to_string(),
                    message: format!("severity mapping value `{n}` is not an integer"),
                })?;
                self.numbers.insert(value, severity);
            }
            MappingValue::Scalar(other) => {
                return Err(BuildError::InvalidConfig {
                    id: id.to_string(),
                    message: format!("`{other}` cannot match a severity"),
                });
            }
        }
        Ok(())
    }

    /// Parse the configured field and set the entry's severity.
    ///
    /// Text lookups are case-insensitive; numeric lookups fall back to
    /// range matchers; values that match nothing map to
    /// [`Severity::Default`] without error. On success the raw value is
    /// moved to `preserve_to` when one is configured.
    pub fn parse(&self, entry: &mut Entry) -> Result<(), SeverityParseError> {
        let value = entry
            .get(&self.parse_from)
            .ok_or_else(|| SeverityParseError::MissingField(self.parse_from.to_string()))?;

        let severity = match &value {
            Value::String(s) => {
                let lowered = s.to_ascii_lowercase();
                self.text.get(&lowered).copied().or_else(|| {
                    lowered.parse::<i64>().ok().and_then(|n| self.lookup_number(n))
                })
            }
            Value::Number(n) => n.as_i64().and_then(|n| self.lookup_number(n)),
            _ => return Err(SeverityParseError::NotScalar),
        };

        entry.severity = severity.unwrap_or(Severity::Default);
        if let Some(preserve_to) = &self.preserve_to {
            entry.delete(&self.parse_from);
            entry.set(preserve_to, value);
        }
        Ok(())
    }

    fn lookup_number(&self, n: i64) -> Option<Severity> {
        self.numbers.get(&n).copied().or_else(|| {
            self.ranges
                .iter()
                .find(|(min, max, _)| (*min..=*max).contains(&n))
                .map(|(_, _, severity)| *severity)
        })
    }
}
