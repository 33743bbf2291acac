//! Request frames and the resolver context handed to factories.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{DiError, DiResult, ErrorKind};
use crate::key::{Key, ServiceKey, ServiceType};
use crate::registration::{AnyArc, DisposeProbe, ErasedMade, Factory, FactoryId, FactoryKind};
use crate::reuse::{Reuse, ScopeName};
use crate::rules::Rules;
use crate::traits::{Resolver, ResolverCore};
use crate::wrappers::{self, Closes, Wrapper};

use super::scope::{ScopeKind, ScopeNode};
use super::Container;

pub(crate) type CloseFn = fn() -> (ErasedMade, Option<DisposeProbe>);
pub(crate) type WrapFn = fn(ResolverContext, ServiceInfo) -> DiResult<AnyArc>;

#[derive(Clone)]
pub(crate) enum Shape {
    Plain,
    Generic {
        family: ServiceType,
        close: CloseFn,
    },
    Wrapper {
        inner: Arc<ServiceInfo>,
        deferred: bool,
        wrap: WrapFn,
    },
}

/// A requested service: capability key plus the shape the call site knows
/// about (open-generic member or wrapper).
#[derive(Clone)]
pub struct ServiceInfo {
    key: Key,
    pub(crate) shape: Shape,
}

impl ServiceInfo {
    /// Plain request for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            key: Key::of::<T>(),
            shape: Shape::Plain,
        }
    }

    /// Plain request for a capability key.
    pub fn from_key(key: Key) -> Self {
        Self { key, shape: Shape::Plain }
    }

    /// Request for the wrapper `W`, unwrapping to `W`'s inner service.
    pub fn wrapped<W: Wrapper>() -> Self {
        Self {
            key: Key::of::<W>(),
            shape: Shape::Wrapper {
                inner: Arc::new(W::inner()),
                deferred: W::DEFERRED,
                wrap: wrappers::wrap_erased::<W>,
            },
        }
    }

    /// Request for the member `A` of the open-generic family `F`.
    pub fn generic<F, A>() -> Self
    where
        F: Closes<A>,
        A: ?Sized + 'static,
    {
        Self {
            key: Key::of::<F::Closed>(),
            shape: Shape::Generic {
                family: ServiceType::of::<F>(),
                close: wrappers::close_erased::<F, A>,
            },
        }
    }

    /// Narrows to a service key.
    pub fn with_key(mut self, key: impl Into<ServiceKey>) -> Self {
        self.key = self.key.with_key(key);
        self
    }

    pub(crate) fn with_optional_key(mut self, key: Option<ServiceKey>) -> Self {
        self.key = self.key.with_optional_key(key);
        self
    }

    /// Narrows to registrations implemented by `I`.
    pub fn with_required_impl<I: ?Sized + 'static>(mut self) -> Self {
        self.key = self.key.with_required_impl::<I>();
        self
    }

    pub(crate) fn with_optional_impl(mut self, required: Option<ServiceType>) -> Self {
        self.key = self.key.with_optional_impl(required);
        self
    }

    /// The capability key.
    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl fmt::Debug for ServiceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match &self.shape {
            Shape::Plain => "plain",
            Shape::Generic { .. } => "generic",
            Shape::Wrapper { .. } => "wrapper",
        };
        f.debug_struct("ServiceInfo").field("key", &self.key).field("shape", &shape).finish()
    }
}

#[derive(Debug, Clone)]
struct FactoryInfo {
    id: FactoryId,
    kind: FactoryKind,
    reuse: Reuse,
    implementation: Option<ServiceType>,
    tracks_disposable: bool,
}

static TRANSIENT: Reuse = Reuse::Transient;

/// One in-flight resolution step.
///
/// Frames link to their parent, forming the chain used for recursion
/// detection, lifespan checks and error diagnostics. Conditions receive the
/// frame being resolved.
pub struct Request {
    key: Key,
    parent: Option<Arc<Request>>,
    boundary: bool,
    factory: Option<FactoryInfo>,
    holder_lifespan: u32,
    opened_scope: Option<ScopeName>,
    depth: usize,
}

impl Request {
    /// Pushes a frame for `key`. `boundary` marks a frame reached through a
    /// resolution call, which stops the recursion and lifespan checks.
    pub(crate) fn push(parent: Option<&Arc<Request>>, key: Key, boundary: bool) -> DiResult<Arc<Request>> {
        let request = Request {
            holder_lifespan: match parent {
                Some(parent) if !boundary => parent.holder_lifespan,
                _ => 0,
            },
            depth: parent.map_or(0, |p| p.depth + 1),
            parent: parent.cloned(),
            key,
            boundary,
            factory: None,
            opened_scope: None,
        };
        request.check_recursion()?;
        Ok(Arc::new(request))
    }

    fn check_recursion(&self) -> DiResult<()> {
        if self.boundary {
            return Ok(());
        }
        let mut current = self.parent.as_deref();
        while let Some(ancestor) = current {
            if ancestor.key == self.key {
                return Err(DiError::new(
                    ErrorKind::RecursiveDependency,
                    format!("{} depends on itself without a resolution call in between", self.key),
                )
                .with_chain(|| self.chain()));
            }
            if ancestor.boundary {
                break;
            }
            current = ancestor.parent.as_deref();
        }
        Ok(())
    }

    /// Fails when `factory` is reused shorter than the reused service holding it.
    pub(crate) fn check_lifespan(&self, factory: &Factory, rules: &Rules) -> DiResult<()> {
        let lifespan = factory.reuse().lifespan();
        if !rules.throw_on_shorter_lifespan() || lifespan == 0 || self.holder_lifespan <= lifespan {
            return Ok(());
        }
        let holder = self
            .ancestors()
            .find(|r| r.reuse().lifespan() == self.holder_lifespan)
            .map(|r| format!("{} ({})", r.key, r.reuse()))
            .unwrap_or_else(|| "its holder".to_string());
        Err(DiError::new(
            ErrorKind::ShorterReuseLifespan,
            format!("{} ({}) would be captured by {}", self.key, factory.reuse(), holder),
        )
        .with_chain(|| self.chain()))
    }

    /// The same frame with the selected factory recorded.
    pub(crate) fn with_factory(&self, factory: &Factory, rules: &Rules) -> Arc<Request> {
        let reuse = factory.reuse().clone();
        let tracks_disposable = reuse.is_transient()
            && factory.is_disposable()
            && (factory.setup().track_disposable_transient || rules.track_disposable_transient());
        Arc::new(Request {
            key: self.key.clone(),
            parent: self.parent.clone(),
            boundary: self.boundary,
            holder_lifespan: if reuse.is_ranked() { reuse.lifespan() } else { self.holder_lifespan },
            opened_scope: factory
                .setup()
                .open_resolution_scope
                .then(|| ScopeName::from(self.key.service().name())),
            depth: self.depth,
            factory: Some(FactoryInfo {
                id: factory.id(),
                kind: factory.kind(),
                reuse,
                implementation: factory.implementation(),
                tracks_disposable,
            }),
        })
    }

    /// The requested capability.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The requested service type.
    pub fn service_type(&self) -> ServiceType {
        self.key.service()
    }

    /// The requested service key.
    pub fn service_key(&self) -> Option<&ServiceKey> {
        self.key.service_key()
    }

    /// The frame that depends on this one.
    pub fn parent(&self) -> Option<&Request> {
        self.parent.as_deref()
    }

    pub(crate) fn parent_frame(&self) -> Option<&Arc<Request>> {
        self.parent.as_ref()
    }

    /// Ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Request> {
        std::iter::successors(self.parent(), |r| r.parent())
    }

    /// Whether the frame was reached through a resolution call.
    pub fn is_resolution_call(&self) -> bool {
        self.boundary
    }

    /// Id of the selected factory, once selected.
    pub fn factory_id(&self) -> Option<FactoryId> {
        self.factory.as_ref().map(|f| f.id)
    }

    /// Kind of the selected factory, once selected.
    pub fn factory_kind(&self) -> Option<FactoryKind> {
        self.factory.as_ref().map(|f| f.kind)
    }

    /// Reuse of the selected factory; transient until one is selected.
    pub fn reuse(&self) -> &Reuse {
        self.factory.as_ref().map_or(&TRANSIENT, |f| &f.reuse)
    }

    /// Implementation type of the selected factory.
    pub fn implementation_type(&self) -> Option<ServiceType> {
        self.factory.as_ref().and_then(|f| f.implementation)
    }

    /// Whether the selected factory tracks its transient disposables itself.
    pub fn tracks_disposable(&self) -> bool {
        self.factory.as_ref().map_or(false, |f| f.tracks_disposable)
    }

    /// Nesting depth; 0 for a top-level request.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Names of the resolution scopes opened by this frame and its ancestors.
    pub(crate) fn opened_scopes(&self) -> impl Iterator<Item = &ScopeName> {
        std::iter::once(self)
            .chain(self.ancestors())
            .filter_map(|r| r.opened_scope.as_ref())
    }

    /// Display names of the frames, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut chain: Vec<String> = std::iter::once(self)
            .chain(self.ancestors())
            .map(|r| r.key.to_string())
            .collect();
        chain.reverse();
        chain
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("key", &self.key)
            .field("reuse", self.reuse())
            .field("depth", &self.depth)
            .field("resolution_call", &self.boundary)
            .finish()
    }
}

/// Context passed to factory functions for resolving dependencies.
///
/// Carries the container view being resolved from, the frame of the service
/// under construction and the scope that owns tracked transients. Resolving
/// through it takes part in recursion and lifespan checks of the enclosing
/// graph.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Container, Registrator, Resolver, Reuse};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let container = Container::new();
/// container.register_instance(Database { url: "postgres://localhost".to_string() }).unwrap();
/// container
///     .register_delegate(Reuse::Transient, |ctx| {
///         Ok(UserService { db: ctx.get::<Database>()? })
///     })
///     .unwrap();
///
/// assert_eq!(container.get_required::<UserService>().db.url, "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct ResolverContext {
    pub(crate) view: Container,
    pub(crate) frame: Option<Arc<Request>>,
    pub(crate) boundary: bool,
    pub(crate) owner: Arc<ScopeNode>,
    pub(crate) resolution: Arc<OnceCell<Arc<ScopeNode>>>,
}

impl ResolverContext {
    /// Context of a new top-level resolve call on `view`.
    pub(crate) fn top(view: Container) -> Self {
        Self {
            owner: view.scope.clone(),
            view,
            frame: None,
            boundary: false,
            resolution: Arc::new(OnceCell::new()),
        }
    }

    /// Context for code running on behalf of `frame` (delegates, decorators).
    pub(crate) fn for_frame(&self, frame: &Arc<Request>) -> Self {
        Self {
            frame: Some(frame.clone()),
            boundary: false,
            ..self.clone()
        }
    }

    pub(crate) fn with_owner(&self, owner: &Arc<ScopeNode>) -> Self {
        Self {
            owner: owner.clone(),
            ..self.clone()
        }
    }

    /// Context inside a promoted resolution scope.
    pub(crate) fn promoted(&self, scope: Arc<ScopeNode>) -> Self {
        let resolution = OnceCell::new();
        let _ = resolution.set(scope.clone());
        Self {
            view: self.view.with_scope(scope.clone()),
            owner: scope,
            resolution: Arc::new(resolution),
            ..self.clone()
        }
    }

    /// The same context, with resolutions made through it crossing a
    /// resolution-call boundary: no recursion or lifespan checks against the
    /// frames above.
    pub fn resolution_call(&self) -> Self {
        Self {
            boundary: true,
            ..self.clone()
        }
    }

    /// The frame of the service being built, if called from a factory.
    pub fn request(&self) -> Option<&Request> {
        self.frame.as_deref()
    }

    /// The container view being resolved from.
    pub fn container(&self) -> &Container {
        &self.view
    }

    /// Name of the current scope.
    pub fn scope_name(&self) -> Option<&str> {
        self.view.scope.name()
    }

    pub(crate) fn root_scope(&self) -> &Arc<ScopeNode> {
        &self.view.core.root
    }

    /// The resolution scope of the current top-level call, opened on first use.
    pub(crate) fn resolution_scope(&self) -> DiResult<Arc<ScopeNode>> {
        self.resolution
            .get_or_try_init(|| self.view.scope.open_child(None, ScopeKind::Resolution))
            .cloned()
    }
}

impl fmt::Debug for ResolverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverContext")
            .field("scope", &self.view.scope)
            .field("frame", &self.frame)
            .field("resolution_call", &self.boundary)
            .finish()
    }
}

impl ResolverCore for ResolverContext {
    fn context(&self) -> ResolverContext {
        self.clone()
    }
}

impl Resolver for ResolverContext {}
