//! # In-process workers
//!
//! A [`Registry`](crate::registry::Registry) implementation that runs workers as
//! tokio tasks in the same process, with events carried on a topic bus.

pub mod builder;
pub mod bus;
pub mod registry;
pub mod worker;

pub use builder::LocalRegistryBuilder;
pub use bus::EventBus;
pub use registry::LocalRegistry;
pub use worker::WorkerContext;
pub use worker::WorkerFactory;
pub use worker::factory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Two sources were registered under the same name.
    DuplicateSource(String),
    /// A preload entry path failed source reference validation.
    InvalidPreload(String),
    /// A preload entry path names no registered source.
    UnknownPreload(String),
    Registry(crate::registry::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateSource(name) => write!(f, "Duplicate worker source: {}", name),
            Self::InvalidPreload(path) => write!(f, "Invalid preload entry path: {:?}", path),
            Self::UnknownPreload(path) => write!(f, "Preload entry path has no registered source: {}", path),
            Self::Registry(e) => write!(f, "Registry error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::registry::Error> for Error {
    fn from(e: crate::registry::Error) -> Self {
        Self::Registry(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
