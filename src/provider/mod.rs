//! The container: registry, root scope and the resolver entry points.
//!
//! A [`Container`] value is a view: the shared registry and root scope, a
//! rules value and the scope it resolves in. Opening a scope or overriding
//! the rules produces another view over the same registry.

use std::fmt;
use std::sync::Arc;

use crate::descriptors::ServiceDescriptor;
use crate::error::{DiError, DiResult, ErrorKind};
use crate::key::Key;
use crate::registration::{Factory, FactoryKind};
use crate::registry::RegistryStore;
use crate::reuse::ScopeName;
use crate::rules::{IfAlreadyRegistered, Rules};
use crate::traits::{Registrator, Resolver, ResolverCore};

mod compiler;
pub mod context;
pub(crate) mod engine;
pub mod scope;

pub(crate) use compiler::Producer;
pub use context::{Request, ResolverContext, ServiceInfo};
pub use scope::{ResolutionScope, Scope};
use scope::{ScopeKind, ScopeNode};

pub(crate) struct ContainerCore {
    pub(crate) registry: RegistryStore,
    pub(crate) root: Arc<ScopeNode>,
}

impl Drop for ContainerCore {
    fn drop(&mut self) {
        if !self.root.is_disposed() {
            tracing::debug!("container dropped, disposing root scope");
            if let Err(e) = self.root.close() {
                tracing::error!(error = %e, "disposing root scope failed");
            }
        }
    }
}

/// The IoC container.
///
/// Cloning is cheap and yields another handle to the same registry and root
/// scope. Singletons live in the root scope until [`dispose`](Self::dispose)
/// or until the last handle is dropped.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Container, Ctor, Made, Param, Registrator, Resolver, Reuse};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let container = Container::new();
/// container.register_instance(Database { url: "postgres://localhost".to_string() }).unwrap();
/// container
///     .register::<UserService>()
///     .reuse(Reuse::Transient)
///     .made(Made::new(
///         Ctor::new(|args| Ok(UserService { db: args.get::<Database>(0)? }))
///             .param(Param::of::<Database>()),
///     ))
///     .register()
///     .unwrap();
///
/// let users = container.get_required::<UserService>();
/// assert_eq!(users.db.url, "postgres://localhost");
/// container.dispose().unwrap();
/// ```
#[derive(Clone)]
pub struct Container {
    pub(crate) core: Arc<ContainerCore>,
    pub(crate) rules: Arc<Rules>,
    pub(crate) scope: Arc<ScopeNode>,
}

impl Container {
    /// Container with default rules.
    pub fn new() -> Self {
        Self::with_rules(Rules::default())
    }

    /// Container with the given rules.
    pub fn with_rules(rules: Rules) -> Self {
        let root = ScopeNode::root();
        tracing::debug!(rules = rules.id(), "container created");
        Self {
            core: Arc::new(ContainerCore {
                registry: RegistryStore::new(),
                root: root.clone(),
            }),
            rules: Arc::new(rules),
            scope: root,
        }
    }

    /// The rules of this view.
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// A view over the same registry and scope with rules derived from these.
    ///
    /// Compiled producers are cached per rules value, so the new view starts
    /// with its own cache.
    pub fn with<F>(&self, configure: F) -> Container
    where
        F: FnOnce(Rules) -> Rules,
    {
        Container {
            core: self.core.clone(),
            rules: Arc::new(configure((*self.rules).clone())),
            scope: self.scope.clone(),
        }
    }

    pub(crate) fn with_scope(&self, scope: Arc<ScopeNode>) -> Container {
        Container {
            core: self.core.clone(),
            rules: self.rules.clone(),
            scope,
        }
    }

    /// Opens a scope nested in this view's scope.
    ///
    /// Fails with `ScopeDisposed` when this view's scope is already disposed.
    pub fn open_scope(&self, name: Option<&str>) -> DiResult<Scope> {
        self.open_scope_with(name, |rules| rules)
    }

    /// Opens a nested scope whose view uses rules derived from these.
    pub fn open_scope_with<F>(&self, name: Option<&str>, configure: F) -> DiResult<Scope>
    where
        F: FnOnce(Rules) -> Rules,
    {
        let node = self.scope.open_child(name.map(ScopeName::from), ScopeKind::Opened)?;
        Ok(Scope::new(self.with(configure).with_scope(node)))
    }

    /// Name of the scope this view resolves in.
    pub fn scope_name(&self) -> Option<&str> {
        self.scope.name()
    }

    /// Disposes the root scope: every open scope, then the tracked singletons
    /// in reverse creation order. A second call is a no-op.
    pub fn dispose(&self) -> DiResult<()> {
        tracing::debug!("disposing container");
        self.core.root.close()
    }

    /// Whether the container has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.core.root.is_disposed()
    }

    /// Descriptors of every registration in the current snapshot, in
    /// registration order.
    pub fn service_descriptors(&self) -> Vec<ServiceDescriptor> {
        let snapshot = self.core.registry.snapshot();
        let mut descriptors: Vec<ServiceDescriptor> = snapshot
            .all_factories()
            .chain(snapshot.all_decorators())
            .map(|f| ServiceDescriptor::from_factory(f))
            .collect();
        descriptors.sort_by_key(|d| d.id);
        descriptors
    }

    /// Human-readable listing of the current registry snapshot.
    #[cfg(feature = "diagnostics")]
    pub fn dump_registry(&self) -> String {
        use std::fmt::Write;

        let version = self.core.registry.snapshot().version();
        let mut out = format!("registry v{} (scope: {})\n", version, self.scope);
        for d in self.service_descriptors() {
            let _ = writeln!(
                out,
                "  {} {:<10} {:?} {}{}{}",
                d.id,
                d.reuse.to_string(),
                d.kind,
                d.key,
                if d.disposable { " [disposable]" } else { "" },
                if d.conditional { " [conditional]" } else { "" },
            );
        }
        out
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("scope", &self.scope)
            .field("rules", &self.rules.id())
            .field("registry_version", &self.core.registry.snapshot().version())
            .finish()
    }
}

impl Registrator for Container {
    fn add_factory(&self, factory: Factory, if_already_registered: Option<IfAlreadyRegistered>) -> DiResult<bool> {
        let setup = factory.setup();
        if factory.kind() == FactoryKind::Service
            && factory.reuse().is_transient()
            && factory.is_disposable()
            && self.rules.throw_on_disposable_transient()
            && !setup.allow_disposable_transient
            && !setup.track_disposable_transient
            && !self.rules.track_disposable_transient()
        {
            return Err(DiError::new(
                ErrorKind::DisposableTransientNotAllowed,
                format!(
                    "{} is a disposable transient; allow it, track it, or give it a reuse",
                    factory.service()
                ),
            ));
        }
        let policy = if_already_registered.unwrap_or_else(|| self.rules.default_if_already_registered());
        self.core.registry.register(Arc::new(factory), policy)
    }

    fn registration_rules(&self) -> Arc<Rules> {
        self.rules.clone()
    }

    fn is_registered(&self, key: &Key) -> bool {
        self.core
            .registry
            .snapshot()
            .factories(key.service().id())
            .iter()
            .any(|f| {
                key.service_key().map_or(true, |k| f.service_key() == Some(k))
                    && key.required_impl().map_or(true, |i| f.implementation() == Some(i))
            })
    }
}

impl ResolverCore for Container {
    fn context(&self) -> ResolverContext {
        ResolverContext::top(self.clone())
    }
}

impl Resolver for Container {}

/// Resolve-only view of the container, resolvable without registration.
///
/// Services that need to resolve lazily by hand take this instead of the
/// container, so they cannot register anything.
#[derive(Clone)]
pub struct ServiceResolver {
    view: Container,
}

impl ServiceResolver {
    pub(crate) fn new(view: Container) -> Self {
        Self { view }
    }

    /// Name of the scope the resolver was injected from.
    pub fn scope_name(&self) -> Option<&str> {
        self.view.scope_name()
    }
}

impl ResolverCore for ServiceResolver {
    fn context(&self) -> ResolverContext {
        ResolverContext::top(self.view.clone())
    }
}

impl Resolver for ServiceResolver {}

impl fmt::Debug for ServiceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceResolver").field("scope", &self.view.scope).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::{Made, Setup};
    use crate::reuse::Reuse;
    use crate::traits::Dispose;

    struct Handle;

    impl Dispose for Handle {
        fn dispose(&self) {}
    }

    #[test]
    fn disposable_transients_are_rejected_unless_allowed() {
        let container = Container::new();
        let err = container
            .register::<Handle>()
            .reuse(Reuse::Transient)
            .disposable()
            .made(Made::of(|| Handle))
            .register()
            .unwrap_err();
        assert!(err.is(ErrorKind::DisposableTransientNotAllowed));

        container
            .register::<Handle>()
            .reuse(Reuse::Transient)
            .disposable()
            .setup(Setup::new().allow_disposable_transient())
            .made(Made::of(|| Handle))
            .register()
            .unwrap();
        assert!(container.is_registered(&Key::of::<Handle>()));
    }

    #[test]
    fn scopes_nest_and_share_the_registry() {
        let container = Container::new();
        let outer = container.open_scope(Some("outer")).unwrap();
        let inner = outer.open_scope(None).unwrap();
        assert_eq!(outer.name(), Some("outer"));
        assert_eq!(inner.name(), None);

        container.register_instance(9u8).unwrap();
        assert_eq!(*inner.get_required::<u8>(), 9);

        outer.dispose().unwrap();
        assert!(inner.is_disposed());
        assert!(inner.open_scope(None).unwrap_err().is(ErrorKind::ScopeDisposed));
    }

    #[test]
    fn disposing_the_container_closes_open_scopes() {
        let container = Container::new();
        let scope = container.open_scope(None).unwrap();
        container.dispose().unwrap();
        assert!(container.is_disposed());
        assert!(scope.is_disposed());
    }

    #[test]
    fn derived_rules_share_registrations() {
        let container = Container::new();
        container.register_instance(1u32).unwrap();
        let relaxed = container.with(|rules| rules.without_implicit_scope_check());
        assert!(!relaxed.rules().implicit_scope_check());
        assert_eq!(*relaxed.get_required::<u32>(), 1);
    }
}
