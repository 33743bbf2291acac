//! Reuse policies controlling how long built instances are kept.

use std::fmt;
use std::sync::Arc;

/// Name of a scope. Resolution scopes opened for a service are named after the
/// service's type name.
pub type ScopeName = Arc<str>;

/// Reuse policy of a registration.
///
/// Ranked policies carry a lifespan used to detect captive dependencies: a
/// reused dependency must not live shorter than the reused service holding it.
///
/// | policy | lifespan | cached in |
/// |---|---|---|
/// | `Singleton` | 1000 | root scope |
/// | `Scoped` / `ScopedTo` | 100 | nearest open scope (with that name) |
/// | `InResolutionScope` | not ranked | resolution scope of the top-level call |
/// | `Transient` | not ranked | never |
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::Reuse;
///
/// assert!(Reuse::Singleton.lifespan() > Reuse::Scoped.lifespan());
/// assert_eq!(Reuse::scoped_to("request").lifespan(), Reuse::Scoped.lifespan());
/// assert!(!Reuse::Transient.is_ranked());
/// assert!(!Reuse::InResolutionScope.is_ranked());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Reuse {
    /// New instance per resolution, never cached.
    #[default]
    Transient,
    /// One instance per container, cached in the root scope.
    Singleton,
    /// One instance per nearest open scope.
    Scoped,
    /// One instance per nearest open scope with the given name.
    ScopedTo(ScopeName),
    /// One instance per top-level resolve call (or per promoted resolution scope).
    InResolutionScope,
}

impl Reuse {
    /// Lifespan of [`Reuse::Singleton`].
    pub const SINGLETON_LIFESPAN: u32 = 1000;
    /// Lifespan of [`Reuse::Scoped`] and [`Reuse::ScopedTo`].
    pub const SCOPED_LIFESPAN: u32 = 100;

    /// Reuse bound to the nearest open scope named `name`.
    pub fn scoped_to(name: impl Into<ScopeName>) -> Self {
        Reuse::ScopedTo(name.into())
    }

    /// Reuse bound to the resolution scope opened for service `T`
    /// (see `Setup::open_resolution_scope`).
    pub fn scoped_to_service<T: ?Sized + 'static>() -> Self {
        Reuse::ScopedTo(Arc::from(std::any::type_name::<T>()))
    }

    /// Numeric lifespan; 0 for unranked policies.
    pub fn lifespan(&self) -> u32 {
        match self {
            Reuse::Singleton => Self::SINGLETON_LIFESPAN,
            Reuse::Scoped | Reuse::ScopedTo(_) => Self::SCOPED_LIFESPAN,
            Reuse::InResolutionScope | Reuse::Transient => 0,
        }
    }

    /// Whether the policy takes part in lifespan mismatch checks.
    pub fn is_ranked(&self) -> bool {
        self.lifespan() > 0
    }

    /// Whether instances are never cached.
    pub fn is_transient(&self) -> bool {
        matches!(self, Reuse::Transient)
    }

    /// The scope name the policy is bound to, if any.
    pub fn scope_name(&self) -> Option<&ScopeName> {
        match self {
            Reuse::ScopedTo(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Reuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reuse::Transient => write!(f, "Transient"),
            Reuse::Singleton => write!(f, "Singleton"),
            Reuse::Scoped => write!(f, "Scoped"),
            Reuse::ScopedTo(name) => write!(f, "ScopedTo({})", name),
            Reuse::InResolutionScope => write!(f, "InResolutionScope"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking() {
        assert!(Reuse::Singleton.lifespan() > Reuse::Scoped.lifespan());
        assert!(Reuse::Scoped.is_ranked());
        assert!(!Reuse::InResolutionScope.is_ranked());
        assert_eq!(Reuse::default(), Reuse::Transient);
    }

    #[test]
    fn scoped_to_service_uses_type_name() {
        struct Handler;
        let reuse = Reuse::scoped_to_service::<Handler>();
        assert_eq!(reuse.scope_name().map(|n| &**n), Some(std::any::type_name::<Handler>()));
    }

    #[test]
    fn display() {
        assert_eq!(Reuse::scoped_to("request").to_string(), "ScopedTo(request)");
        assert_eq!(Reuse::Singleton.to_string(), "Singleton");
    }
}
