//! Layered configuration loading and lookup.

mod convert;
mod de;
mod error;
mod expand;
mod file;
mod resolver;
mod source;
mod value;

pub use convert::{ConversionError, FromValue};
pub use de::DecodeError;
pub use error::ConfigError;
pub use file::ConfigFormat;
pub use resolver::ConfigResolver;
pub use source::{Layer, Precedence};
pub use value::{Map, Value, DEFAULT_DELIMITER};
