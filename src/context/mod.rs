//! Application context for sharing one resolver between components.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::{ConfigResolver, Error};

/// Central application context holding the configuration resolver.
///
/// Components receive the context (or a clone of its resolver handle)
/// instead of reaching for a global instance, so tests can build a context
/// per case with its own configuration.
///
/// ## Example
///
/// ```no_run
/// use layercfg::{AppContext, ConfigResolver};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Server {
///     host: String,
///     port: u16,
/// }
///
/// let resolver = ConfigResolver::new();
/// resolver.load("configs/env.json")?;
///
/// let ctx = AppContext::builder().with_resolver(resolver).build()?;
/// let server: Server = ctx.section("prod")?;
/// # Ok::<(), layercfg::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct AppContext {
    resolver: Arc<ConfigResolver>,
}

impl AppContext {
    /// Creates a new builder for constructing an `AppContext`.
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder { resolver: None }
    }

    /// Returns the shared resolver.
    pub fn config(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Returns a handle to the resolver for components that outlive the context.
    pub fn shared_config(&self) -> Arc<ConfigResolver> {
        Arc::clone(&self.resolver)
    }

    /// Decodes the configuration section at `key`.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T, Error> {
        Ok(self.resolver.unmarshal_key(key)?)
    }
}

/// Builder for constructing an [`AppContext`].
#[derive(Debug, Default)]
#[must_use = "builders do nothing until .build() is called"]
pub struct AppContextBuilder {
    resolver: Option<Arc<ConfigResolver>>,
}

impl AppContextBuilder {
    /// Attaches the resolver, either owned or already shared.
    pub fn with_resolver(mut self, resolver: impl Into<Arc<ConfigResolver>>) -> Self {
        self.resolver = Some(resolver.into());
        self
    }

    /// Builds the `AppContext`.
    ///
    /// Returns an error if no resolver was provided.
    pub fn build(self) -> Result<AppContext, Error> {
        Ok(AppContext {
            resolver: self.resolver.ok_or(Error::MissingResolver)?,
        })
    }
}
