//! Ordered, side-effect-free composition of [`Options`] into a [`ServerConfig`].

use axum::Router;

use crate::config::schema::{Options, ServerConfig, TlsPolicy};

/// Builds an immutable [`ServerConfig`] from a base and a sequence of overrides.
///
/// Overrides apply in the order given; for each field the last non-zero value
/// wins. Injected collaborators (router, logger) follow the same rule: only a
/// supplied value replaces the current one.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    base: ServerConfig,
    options: Vec<Options>,
    router: Option<Router>,
    logger: Option<tracing::Dispatch>,
}

impl ConfigBuilder {
    /// Start from [`ServerConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the base configuration.
    pub fn base(mut self, base: ServerConfig) -> Self {
        self.base = base;
        self
    }

    /// Append an override.
    pub fn option(mut self, options: Options) -> Self {
        self.options.push(options);
        self
    }

    /// Append several overrides, preserving order.
    pub fn options<I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = Options>,
    {
        self.options.extend(options);
        self
    }

    /// Inject the handler set.
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Inject the lifecycle logger.
    pub fn logger(mut self, logger: tracing::Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Resolve everything into the final configuration.
    ///
    /// The base goes through the same zero-means-unset rule as the
    /// overrides, so every timeout in the result is strictly positive.
    pub fn build(self) -> ServerConfig {
        let mut config = self.base;
        if let Some(tls) = config.tls.as_ref().filter(|policy| policy.is_partial()) {
            warn_partial(tls);
        }
        for options in &self.options {
            if options.tls.is_partial() {
                warn_partial(&options.tls);
            }
            config = ServerConfig::merge(&config, options);
        }
        if let Some(router) = self.router {
            config.router = router;
        }
        if self.logger.is_some() {
            config.logger = self.logger;
        }
        config.with_defaults()
    }
}

fn warn_partial(tls: &TlsPolicy) {
    tracing::warn!(
        certificate = %tls.certificate,
        key = %tls.key,
        "Ignoring partially specified TLS policy, serving plaintext"
    );
}
