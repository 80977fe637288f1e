//! Middleware composition.
//!
//! A [`Chain`] holds already-adapted middleware in declaration order and nests
//! them around a terminal handler by folding from the last layer to the first:
//!
//! ```text
//! Chain::new([a, b, c])?.then(h)?   ==   a.wrap(b.wrap(c.wrap(h)))
//! ```
//!
//! so at request time `a` runs first (and last, if it does work after `next`).
//! Composition happens once, at configuration time. The resulting handler holds
//! no per-request state and is shared by every request.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{BoxedMiddleware, Layer, Middleware, adapt_middleware};
use crate::error::ConfigError;
use crate::handler::{BoxedHandler, Endpoint, adapt_handler};

/// An ordered, validated list of middleware.
///
/// Cloning is cheap; the layers are shared.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Arc<[BoxedMiddleware]>,
}

impl Chain {
    /// Adapts every layer, failing on the first one that is `None` or of an
    /// unsupported shape. No layer is composed until all of them adapt.
    ///
    /// ```rust
    /// use braid::{Chain, Layer, middleware::trace::Trace};
    ///
    /// let chain = Chain::new([Layer::middleware(Trace)]).unwrap();
    /// assert_eq!(chain.len(), 1);
    /// ```
    pub fn new<I>(layers: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator,
        I::Item: Into<Option<Layer>>,
    {
        let layers = layers
            .into_iter()
            .enumerate()
            .map(|(index, layer)| adapt_middleware(index, layer))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { layers: layers.into() })
    }

    pub fn len(&self) -> usize { self.layers.len() }
    pub fn is_empty(&self) -> bool { self.layers.is_empty() }

    /// Adapts `terminal` and wraps the chain around it.
    ///
    /// May be called any number of times; each call yields an independent
    /// handler with identical behaviour.
    pub fn then(&self, terminal: impl Into<Option<Endpoint>>) -> Result<BoxedHandler, ConfigError> {
        let terminal = adapt_handler(terminal)?;
        debug!(layers = self.len(), "pipeline composed");
        Ok(self.wrap(terminal))
    }
}

impl Middleware for Chain {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self.layers.iter().rev().fold(next, |next, layer| layer.wrap(next))
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("layers", &self.layers.len()).finish()
    }
}

/// Composes `layers` around `terminal` into one handler.
///
/// The terminal is adapted first, then every layer; any failure is returned
/// before a single handler has run. With no layers this is plain
/// [`adapt_handler`].
pub fn compose<I>(layers: I, terminal: impl Into<Option<Endpoint>>) -> Result<BoxedHandler, ConfigError>
where
    I: IntoIterator,
    I::Item: Into<Option<Layer>>,
{
    let terminal = adapt_handler(terminal)?;
    let chain = Chain::new(layers)?;
    debug!(layers = chain.len(), "pipeline composed");
    Ok(chain.wrap(terminal))
}
