//! Core traits for dependency injection.

mod dispose;
mod registrator;
mod resolver;

pub use dispose::Dispose;
pub use registrator::Registrator;
pub use resolver::{Resolver, ResolverCore};
pub(crate) use resolver::{downcast, downcast_trait};
