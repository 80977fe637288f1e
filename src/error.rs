//! Error types.
//!
//! braid separates failures into three classes:
//!
//! - [`ConfigError`]: raised while adapting or composing handlers and
//!   middleware. Returned synchronously from the registration API, so a
//!   misconfigured pipeline never reaches [`Server::serve`](crate::Server::serve).
//! - [`Fault`]: raised while a composed handler runs: an error value handed
//!   to the renderer, or a serialization failure. Faults travel up through
//!   [`Outcome`] to the recovery boundary, they are never rendered as data.
//! - [`Error`]: infrastructure failures of the server glue.

use std::fmt;
use std::sync::Arc;

/// The result of running a handler.
pub type Outcome = Result<(), Fault>;

/// A handler or middleware could not be adapted to the canonical contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("handler is nil")]
    NilHandler,

    #[error("unsupported handler type `{shape}`")]
    UnsupportedHandler { shape: &'static str },

    #[error("middleware at index {index} is nil")]
    NilMiddleware { index: usize },

    #[error("unsupported middleware type `{shape}` at index {index}")]
    UnsupportedMiddleware { index: usize, shape: &'static str },
}

impl ConfigError {
    /// Re-labels a handler failure as a failure of the middleware at `index`.
    pub(crate) fn at_index(self, index: usize) -> Self {
        match self {
            Self::NilHandler => Self::NilMiddleware { index },
            Self::UnsupportedHandler { shape } => Self::UnsupportedMiddleware { index, shape },
            other => other,
        }
    }
}

/// A request-time failure escalated past the handler that raised it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Fault {
    /// A result value that represents an error.
    #[error(transparent)]
    Escalated(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The result value could not be serialized into the negotiated format.
    #[error("failed to encode {format} body: {message}")]
    Encode { format: &'static str, message: String },
}

impl Fault {
    /// Escalates any error value.
    pub fn escalate<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Escalated(Arc::new(err))
    }

    /// Escalates an already-boxed error value.
    pub fn from_boxed(err: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        Self::Escalated(Arc::from(err))
    }

    pub(crate) fn encode(format: &'static str, err: impl fmt::Display) -> Self {
        Self::Encode { format, message: err.to_string() }
    }
}

/// Infrastructure errors surfaced by the server glue.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    Addr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
