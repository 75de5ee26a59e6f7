#![deny(missing_docs)]
//! Builtin operators for lumber.
//!
//! Concrete implementations of the three archetypes: inputs
//! ([`TcpInputConfig`], [`GenerateInputConfig`]), parsers and
//! transformers ([`JsonParserConfig`], [`RegexParserConfig`],
//! [`NoopConfig`]), and outputs ([`StdoutConfig`], [`HttpOutputConfig`]).
//!
//! Nothing registers itself; call [`register_all`] (or the umbrella
//! crate's `default_registry`) to install the set into a registry.

pub mod input;
pub mod output;
pub mod parser;
pub mod transformer;

pub use input::generate::GenerateInputConfig;
pub use input::tcp::TcpInputConfig;
pub use output::http::HttpOutputConfig;
pub use output::stdout::StdoutConfig;
pub use parser::json::JsonParserConfig;
pub use parser::regex::RegexParserConfig;
pub use transformer::noop::NoopConfig;

use lumber_operator::{BuildError, Registry};

/// Register every builtin operator type into `registry`.
pub fn register_all(registry: &mut Registry) -> Result<(), BuildError> {
    registry.register::<TcpInputConfig>("tcp_input")?;
    registry.register::<GenerateInputConfig>("generate_input")?;
    registry.register::<JsonParserConfig>("json_parser")?;
    registry.register::<RegexParserConfig>("regex_parser")?;
    registry.register::<NoopConfig>("noop")?;
    registry.register::<StdoutConfig>("stdout")?;
    registry.register::<HttpOutputConfig>("http_output")?;
    Ok(())
}
