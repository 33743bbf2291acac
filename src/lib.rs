//! # ferrous-ioc
//!
//! Resolution and lifetime engine for an inversion-of-control container.
//!
//! ## Features
//!
//! - **Snapshot registry**: registrations publish immutable snapshots; resolutions in flight never
//!   observe a half-applied change
//! - **Reuse policies**: transient, singleton, scoped, scoped-to-name and per-resolution-call reuse
//! - **Exactly-once builds**: concurrent resolutions of a reused service share one instance
//! - **Decorators and initializers**: per service type or for every resolved object
//! - **Deterministic disposal**: nested scopes first, then tracked instances in reverse creation order
//! - **Wrappers**: `Lazy<T>`, `Func<T>`, `Many<T>`, lazy enumeration and user-defined wrappers
//! - **Open generics**: one registration serves every closed member of a family
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_ioc::{Container, Ctor, Made, Param, Registrator, Resolver, Reuse};
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let container = Container::new();
//! container
//!     .register::<Database>()
//!     .reuse(Reuse::Singleton)
//!     .delegate(|_| Ok(Database { connection_string: "postgres://localhost".to_string() }))
//!     .register()
//!     .unwrap();
//! container
//!     .register_made(Made::new(
//!         Ctor::new(|args| Ok(UserService { db: args.get::<Database>(0)? }))
//!             .param(Param::of::<Database>()),
//!     ))
//!     .unwrap();
//!
//! let users = container.get_required::<UserService>();
//! assert_eq!(users.db.connection_string, "postgres://localhost");
//! ```
//!
//! ## Reuse
//!
//! - **Transient**: built on every resolution
//! - **Singleton**: built once, owned by the root scope
//! - **Scoped**: built once per opened scope
//! - **ScopedTo(name)**: built once in the nearest open scope with that name
//! - **InResolutionScope**: built once per top-level resolve call
//!
//! A reused service may not depend on a service that is reused for a shorter time; such graphs
//! fail with [`ErrorKind::ShorterReuseLifespan`] unless the dependency goes through a resolution
//! call (for example a [`Lazy`] wrapper).
//!
//! ## Trait Resolution
//!
//! ```rust
//! use ferrous_ioc::{Container, Registrator, Resolver, Reuse};
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, message: &str) -> String;
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, message: &str) -> String {
//!         format!("[LOG] {}", message)
//!     }
//! }
//!
//! let container = Container::new();
//! container
//!     .register_trait::<dyn Logger>()
//!     .reuse(Reuse::Singleton)
//!     .delegate(|_| Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>))
//!     .register()
//!     .unwrap();
//!
//! let logger = container.get_required_trait::<dyn Logger>();
//! assert_eq!(logger.log("hello"), "[LOG] hello");
//! ```
//!
//! ## Scopes and Disposal
//!
//! ```rust
//! use ferrous_ioc::{Container, Dispose, Registrator, Resolver, Reuse};
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! #[derive(Default)]
//! struct Connection { closed: AtomicBool }
//!
//! impl Dispose for Connection {
//!     fn dispose(&self) {
//!         self.closed.store(true, Ordering::SeqCst);
//!     }
//! }
//!
//! let container = Container::new();
//! container
//!     .register::<Connection>()
//!     .reuse(Reuse::Scoped)
//!     .disposable()
//!     .delegate(|_| Ok(Connection::default()))
//!     .register()
//!     .unwrap();
//!
//! let scope = container.open_scope(Some("request")).unwrap();
//! let connection = scope.get_required::<Connection>();
//! scope.dispose().unwrap();
//! assert!(connection.closed.load(Ordering::SeqCst));
//! ```

pub mod collection;
pub mod decoration;
pub mod descriptors;
pub mod error;
pub mod key;
pub mod provider;
pub mod registration;
pub mod reuse;
pub mod rules;
pub mod traits;
pub mod wrappers;

mod internal;
mod registry;

pub use collection::{RegistrationBuilder, ServiceRegistrator};
pub use decoration::DisposableTracker;
pub use descriptors::ServiceDescriptor;
pub use error::{DiError, DiResult, ErrorKind};
pub use key::{key_of_type, Key, ObjectKey, ServiceKey, ServiceType};
pub use provider::{Container, Request, ResolutionScope, ResolverContext, Scope, ServiceInfo, ServiceResolver};
pub use registration::{
    Args, Condition, Ctor, DisposeProbe, Factory, FactoryId, FactoryKind, IfUnresolved, Instance, Made, Param, Setup,
};
pub use reuse::{Reuse, ScopeName};
pub use rules::{ConstructorSelector, FactorySelector, IfAlreadyRegistered, Rules};
pub use traits::{Dispose, Registrator, Resolver, ResolverCore};
pub use wrappers::{Closes, Func, GenericFamily, Lazy, LazyMany, LazyManyIter, Many, WrapSource, Wrapper};

#[cfg(feature = "config")]
pub use rules::RulesConfig;
