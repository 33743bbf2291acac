//! Error types for the dependency injection container.

use thiserror::Error;

/// The kind of failure a [`DiError`] reports.
///
/// Registration-time kinds surface from `register*` calls, resolution-time kinds
/// from `get*`/`resolve*` calls and scope kinds from `open_scope`/`dispose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// No registration, wrapper, fallback container or unknown-service resolver matched.
    #[error("unknown service")]
    UnknownService,
    /// More than one default registration matched and no factory selector narrowed it down.
    #[error("ambiguous default registrations")]
    AmbiguousDefaults,
    /// A request revisited an ancestor's capability without an intervening resolution call.
    #[error("recursive dependency")]
    RecursiveDependency,
    /// A reused dependency lives shorter than the reused service holding it.
    #[error("shorter reuse lifespan")]
    ShorterReuseLifespan,
    /// Resolution would capture a delegate, a literal instance or a non-primitive key.
    #[error("runtime state required")]
    RuntimeStateRequired,
    /// The scope was already disposed.
    #[error("scope disposed")]
    ScopeDisposed,
    /// A transient disposable was registered without allowing or tracking it.
    #[error("disposable transient not allowed")]
    DisposableTransientNotAllowed,
    /// A required constructor parameter could not be resolved.
    #[error("unresolved required parameter")]
    UnresolvedRequiredParameter,
    /// Scoped reuse was requested but no matching scope is open.
    #[error("no current scope")]
    NoCurrentScope,
    /// The merge policy rejected a registration for an already registered capability.
    #[error("already registered")]
    AlreadyRegistered,
    /// No single construction recipe could be selected.
    #[error("constructor selection failed")]
    ConstructorSelection,
    /// A resolved instance did not have the type the call site asked for.
    #[error("type mismatch")]
    TypeMismatch,
    /// One or more disposers failed while a scope was closing.
    #[error("dispose failed")]
    DisposeFailed,
}

/// Dependency injection error.
///
/// Carries the [`ErrorKind`], a human readable message and the chain of request
/// frames (outermost first) that was being resolved when the failure happened.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Container, ErrorKind, Resolver};
///
/// let container = Container::new();
/// let err = container.get::<String>().unwrap_err();
/// assert_eq!(err.kind(), ErrorKind::UnknownService);
/// assert!(err.to_string().contains("alloc::string::String"));
/// ```
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}{}", render_chain(.request_chain))]
pub struct DiError {
    kind: ErrorKind,
    message: String,
    request_chain: Vec<String>,
}

fn render_chain(chain: &[String]) -> String {
    if chain.is_empty() {
        String::new()
    } else {
        format!(" (in {})", chain.join(" -> "))
    }
}

impl DiError {
    /// Creates an error of the given kind with no request chain.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            request_chain: Vec::new(),
        }
    }

    /// The failure kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The message without the request chain.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Display names of the request frames, outermost first.
    pub fn request_chain(&self) -> &[String] {
        &self.request_chain
    }

    /// Returns true if this error is of `kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Attaches the request chain unless an inner frame already attached one.
    pub(crate) fn with_chain(mut self, chain: impl FnOnce() -> Vec<String>) -> Self {
        if self.request_chain.is_empty() {
            self.request_chain = chain();
        }
        self
    }

    /// Re-labels the error, keeping the chain.
    pub(crate) fn rekind(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.kind = kind;
        self.message = message.into();
        self
    }

    pub(crate) fn unknown_service(name: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::UnknownService, format!("unable to resolve {}", name))
    }

    pub(crate) fn type_mismatch(expected: &'static str) -> Self {
        Self::new(ErrorKind::TypeMismatch, format!("resolved instance is not a {}", expected))
    }

    pub(crate) fn scope_disposed(scope: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::ScopeDisposed, format!("{} is already disposed", scope))
    }
}

/// Result type for DI operations.
pub type DiResult<T> = Result<T, DiError>;
