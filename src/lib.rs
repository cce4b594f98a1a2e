pub mod config;
pub mod context;
mod error;

pub use config::{ConfigError, ConfigFormat, ConfigResolver, Layer, Precedence, Value};
pub use context::AppContext;
pub use error::Error;
