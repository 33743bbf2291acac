//! Producer descriptors ("factories") and construction recipes.
//!
//! A [`Factory`] is the immutable registration record: id, recipe, reuse and
//! setup flags. Later registrations supersede factories according to the merge
//! policy; a factory itself is never edited.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{DiError, DiResult, ErrorKind};
use crate::key::{ServiceKey, ServiceType};
use crate::provider::{Request, ResolverContext, ServiceInfo};
use crate::reuse::Reuse;
use crate::traits::Dispose;

// Type-erased Arc for storage
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type DelegateFn = Arc<dyn Fn(&ResolverContext) -> DiResult<AnyArc> + Send + Sync>;
pub(crate) type DecorateFn = Arc<dyn Fn(&Instance, &ResolverContext) -> DiResult<AnyArc> + Send + Sync>;

/// Probe turning a type-erased instance into its `Dispose` view.
pub type DisposeProbe = fn(&Arc<dyn Any + Send + Sync>) -> Option<Arc<dyn Dispose>>;

/// Condition predicate evaluated against the request being resolved.
pub type Condition = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

pub(crate) fn dispose_probe<T: Dispose>(value: &AnyArc) -> Option<Arc<dyn Dispose>> {
    value.clone().downcast::<T>().ok().map(|v| v as Arc<dyn Dispose>)
}

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

/// Unique, monotonically increasing factory id. Registration order follows id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactoryId(u64);

impl FactoryId {
    pub(crate) fn next() -> Self {
        FactoryId(NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(id: u64) -> Self {
        FactoryId(id)
    }

    /// Raw id value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What role a factory plays in resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactoryKind {
    /// Produces the requested service.
    Service,
    /// Transforms an already resolved instance.
    Decorator,
    /// Produces a wrapper around an inner service (lazy, many, ...).
    Wrapper,
}

/// A built instance together with its disposal view.
#[derive(Clone)]
pub struct Instance {
    value: AnyArc,
    disposable: Option<Arc<dyn Dispose>>,
    type_name: &'static str,
}

impl Instance {
    pub(crate) fn new(value: AnyArc, disposable: Option<Arc<dyn Dispose>>, type_name: &'static str) -> Self {
        Self { value, disposable, type_name }
    }

    /// The type-erased instance.
    pub fn value(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.value
    }

    /// Downcasts to a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// The `Dispose` view, if the instance was registered as disposable.
    pub fn disposable(&self) -> Option<&Arc<dyn Dispose>> {
        self.disposable.as_ref()
    }

    /// Type name of the service the instance was resolved as.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn into_value(self) -> AnyArc {
        self.value
    }

    pub(crate) fn replace_value(mut self, value: AnyArc) -> Self {
        self.value = value;
        self
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .field("disposable", &self.disposable.is_some())
            .finish()
    }
}

/// Registration setup flags.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Setup, Reuse};
///
/// let setup = Setup::new()
///     .condition(|req| req.parent().map_or(false, |p| p.reuse() == &Reuse::Transient))
///     .as_resolution_call();
/// assert!(setup.is_resolution_call());
/// ```
#[derive(Clone)]
pub struct Setup {
    pub(crate) kind: FactoryKind,
    pub(crate) condition: Option<Condition>,
    pub(crate) allow_disposable_transient: bool,
    pub(crate) track_disposable_transient: bool,
    pub(crate) open_resolution_scope: bool,
    pub(crate) as_resolution_call: bool,
    pub(crate) use_decoratee_reuse: bool,
    pub(crate) metadata: Option<ServiceKey>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            kind: FactoryKind::Service,
            condition: None,
            allow_disposable_transient: false,
            track_disposable_transient: false,
            open_resolution_scope: false,
            as_resolution_call: false,
            use_decoratee_reuse: false,
            metadata: None,
        }
    }
}

impl Setup {
    /// Default service setup.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn decorator() -> Self {
        Self {
            kind: FactoryKind::Decorator,
            ..Self::default()
        }
    }

    /// Only match requests for which `condition` returns true.
    pub fn condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Allow registering a transient disposable without tracking it.
    pub fn allow_disposable_transient(mut self) -> Self {
        self.allow_disposable_transient = true;
        self
    }

    /// Track transient disposables in the owning scope.
    pub fn track_disposable_transient(mut self) -> Self {
        self.track_disposable_transient = true;
        self
    }

    /// Build each instance inside a fresh resolution scope named after the service.
    pub fn open_resolution_scope(mut self) -> Self {
        self.open_resolution_scope = true;
        self
    }

    /// Inject through a resolution call instead of inline construction.
    pub fn as_resolution_call(mut self) -> Self {
        self.as_resolution_call = true;
        self
    }

    /// For decorators: cache the decorated value with the decoratee's reuse
    /// instead of decorating on every resolve.
    pub fn use_decoratee_reuse(mut self) -> Self {
        self.use_decoratee_reuse = true;
        self
    }

    /// Attach metadata. Non-primitive metadata counts as runtime state.
    pub fn metadata(mut self, metadata: impl Into<ServiceKey>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// The factory kind.
    pub fn kind(&self) -> FactoryKind {
        self.kind
    }

    /// Whether the factory is injected through a resolution call.
    pub fn is_resolution_call(&self) -> bool {
        self.as_resolution_call
    }

    /// Attached metadata.
    pub fn get_metadata(&self) -> Option<&ServiceKey> {
        self.metadata.as_ref()
    }

    pub(crate) fn matches(&self, request: &Request) -> bool {
        self.condition.as_ref().map_or(true, |c| c(request))
    }
}

impl fmt::Debug for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setup")
            .field("kind", &self.kind)
            .field("conditional", &self.condition.is_some())
            .field("open_resolution_scope", &self.open_resolution_scope)
            .field("as_resolution_call", &self.as_resolution_call)
            .finish()
    }
}

/// Per-parameter policy when the dependency cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfUnresolved {
    /// Fail the resolution.
    #[default]
    Throw,
    /// Use the configured default value, or leave the slot empty.
    ReturnDefault,
}

/// A constructor parameter or writable member dependency.
///
/// Parameters default to [`IfUnresolved::Throw`]; members default to
/// [`IfUnresolved::ReturnDefault`] (left unset).
#[derive(Clone)]
pub struct Param {
    pub(crate) info: ServiceInfo,
    pub(crate) if_unresolved: Option<IfUnresolved>,
    pub(crate) default: Option<AnyArc>,
    pub(crate) as_resolution_call: bool,
}

impl Param {
    /// Dependency on service `T`.
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self::from_info(ServiceInfo::of::<T>())
    }

    /// Dependency on a trait-object service registered with `register_trait`.
    pub fn trait_of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self::from_info(ServiceInfo::of::<Arc<T>>())
    }

    /// Dependency on a wrapper, e.g. `Param::wrapped::<Lazy<Db>>()`.
    pub fn wrapped<W: crate::wrappers::Wrapper>() -> Self {
        Self::from_info(ServiceInfo::wrapped::<W>())
    }

    /// Dependency on the member `A` of an open-generic family.
    pub fn generic<F, A>() -> Self
    where
        F: crate::wrappers::Closes<A>,
        A: ?Sized + 'static,
    {
        Self::from_info(ServiceInfo::generic::<F, A>())
    }

    /// Dependency described by an explicit service info.
    pub fn from_info(info: ServiceInfo) -> Self {
        Self {
            info,
            if_unresolved: None,
            default: None,
            as_resolution_call: false,
        }
    }

    /// Narrow to a service key.
    pub fn key(mut self, key: impl Into<ServiceKey>) -> Self {
        self.info = self.info.with_key(key);
        self
    }

    /// Narrow to registrations implemented by `I`.
    pub fn required_impl<I: ?Sized + 'static>(mut self) -> Self {
        self.info = self.info.with_required_impl::<I>();
        self
    }

    /// Leave the argument empty when unresolved.
    pub fn optional(mut self) -> Self {
        self.if_unresolved = Some(IfUnresolved::ReturnDefault);
        self
    }

    /// Fail when unresolved (the default for constructor parameters).
    pub fn required(mut self) -> Self {
        self.if_unresolved = Some(IfUnresolved::Throw);
        self
    }

    /// Use `value` when unresolved.
    pub fn with_default<V: Send + Sync + 'static>(mut self, value: V) -> Self {
        self.if_unresolved = Some(IfUnresolved::ReturnDefault);
        self.default = Some(Arc::new(value));
        self
    }

    /// Resolve this dependency through a resolution call at invocation time.
    pub fn as_resolution_call(mut self) -> Self {
        self.as_resolution_call = true;
        self
    }

    /// The requested service.
    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }
}

/// Resolved constructor arguments, in parameter order.
pub struct Args {
    values: Vec<Option<AnyArc>>,
    names: Vec<&'static str>,
}

impl Args {
    pub(crate) fn new(values: Vec<Option<AnyArc>>, names: Vec<&'static str>) -> Self {
        Self { values, names }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn slot(&self, index: usize) -> DiResult<Option<&AnyArc>> {
        self.values.get(index).map(|v| v.as_ref()).ok_or_else(|| {
            DiError::new(
                ErrorKind::UnresolvedRequiredParameter,
                format!("constructor has no parameter {}", index),
            )
        })
    }

    /// Required argument `index` as `T`.
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<T>> {
        let value = self.slot(index)?.ok_or_else(|| {
            DiError::new(
                ErrorKind::UnresolvedRequiredParameter,
                format!("parameter {} ({}) was not resolved", index, self.names[index]),
            )
        })?;
        value
            .clone()
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch(std::any::type_name::<T>()))
    }

    /// Optional argument `index` as `T`; `None` when left unresolved.
    pub fn optional<T: Send + Sync + 'static>(&self, index: usize) -> DiResult<Option<Arc<T>>> {
        match self.slot(index)? {
            None => Ok(None),
            Some(value) => value
                .clone()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| DiError::type_mismatch(std::any::type_name::<T>())),
        }
    }

    /// Required trait-object argument registered with `register_trait`.
    pub fn get_trait<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<T>> {
        self.get::<Arc<T>>(index).map(|boxed| (*boxed).clone())
    }
}

type BuildFn<T> = Arc<dyn Fn(&Args) -> DiResult<T> + Send + Sync>;
type MemberSetter<T> = Arc<dyn Fn(&mut T, AnyArc) + Send + Sync>;
pub(crate) type InvokeFn = Arc<dyn Fn(&Args, Vec<Option<AnyArc>>) -> DiResult<AnyArc> + Send + Sync>;

/// One construction recipe: a parameter list and a build closure.
pub struct Ctor<T> {
    params: Vec<Param>,
    build: BuildFn<T>,
}

impl<T: Send + Sync + 'static> Ctor<T> {
    /// Recipe without parameters yet; add them with [`Ctor::param`].
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&Args) -> DiResult<T> + Send + Sync + 'static,
    {
        Self {
            params: Vec::new(),
            build: Arc::new(build),
        }
    }

    /// Appends a parameter.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }
}

struct Member<T> {
    param: Param,
    set: MemberSetter<T>,
}

/// Declarative construction recipe for `T`.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Container, Ctor, Made, Param, Registrator, Resolver};
/// use std::sync::Arc;
///
/// struct Engine;
/// struct Car { engine: Arc<Engine>, horn: Option<Arc<String>> }
///
/// let container = Container::new();
/// container.register_made(Made::of(|| Engine)).unwrap();
/// container.register_made(
///     Made::new(
///         Ctor::new(|args| Ok(Car { engine: args.get::<Engine>(0)?, horn: None }))
///             .param(Param::of::<Engine>()),
///     )
///     .member(Param::of::<String>(), |car: &mut Car, horn: Arc<String>| car.horn = Some(horn)),
/// ).unwrap();
///
/// let car = container.get_required::<Car>();
/// assert!(car.horn.is_none()); // members are left unset when unresolved
/// ```
pub struct Made<T> {
    ctors: Vec<Ctor<T>>,
    members: Vec<Member<T>>,
    disposable: Option<DisposeProbe>,
}

impl<T: Send + Sync + 'static> Made<T> {
    /// Recipe with a single constructor.
    pub fn new(ctor: Ctor<T>) -> Self {
        Self {
            ctors: vec![ctor],
            members: Vec::new(),
            disposable: None,
        }
    }

    /// Recipe with a parameterless constructor.
    pub fn of<F>(build: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(Ctor::new(move |_| Ok(build())))
    }

    /// Adds an alternative constructor. Selection among several needs the
    /// `MostResolvable` constructor selector rule.
    pub fn or(mut self, ctor: Ctor<T>) -> Self {
        self.ctors.push(ctor);
        self
    }

    /// Adds a writable member set after construction.
    pub fn member<D, F>(mut self, param: Param, set: F) -> Self
    where
        D: Send + Sync + 'static,
        F: Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    {
        let setter: MemberSetter<T> = Arc::new(move |target: &mut T, value: AnyArc| {
            if let Ok(value) = value.downcast::<D>() {
                set(target, value);
            }
        });
        self.members.push(Member { param, set: setter });
        self
    }

    pub(crate) fn into_erased(self) -> (ErasedMade, Option<DisposeProbe>) {
        let setters: Arc<Vec<MemberSetter<T>>> =
            Arc::new(self.members.iter().map(|m| m.set.clone()).collect());
        let member_params = self.members.into_iter().map(|m| m.param).collect();
        let ctors = self
            .ctors
            .into_iter()
            .map(|ctor| {
                let build = ctor.build;
                let setters = setters.clone();
                let invoke: InvokeFn = Arc::new(move |args, members| {
                    let mut value = build(args)?;
                    for (set, member) in setters.iter().zip(members) {
                        if let Some(member) = member {
                            set(&mut value, member);
                        }
                    }
                    Ok(Arc::new(value) as AnyArc)
                });
                ErasedCtor {
                    params: ctor.params,
                    invoke,
                }
            })
            .collect();
        (
            ErasedMade {
                ctors,
                members: member_params,
            },
            self.disposable,
        )
    }
}

impl<T: Dispose> Made<T> {
    /// Declares the built instances disposable.
    pub fn disposable(mut self) -> Self {
        self.disposable = Some(dispose_probe::<T>);
        self
    }
}

pub(crate) struct ErasedCtor {
    pub(crate) params: Vec<Param>,
    pub(crate) invoke: InvokeFn,
}

pub(crate) struct ErasedMade {
    pub(crate) ctors: Vec<ErasedCtor>,
    pub(crate) members: Vec<Param>,
}

/// How a factory builds its instance.
#[derive(Clone)]
pub(crate) enum Recipe {
    /// Declarative constructor recipe with resolvable parameters.
    Made(Arc<ErasedMade>),
    /// Opaque delegate; counts as runtime state.
    Delegate(DelegateFn),
    /// Pre-built instance; counts as runtime state.
    Instance(AnyArc),
    /// Open-generic family; closed by the request's shape.
    OpenGeneric,
    /// Decorator applied to an already built instance.
    Decorator(DecorateFn),
}

impl Recipe {
    fn label(&self) -> &'static str {
        match self {
            Recipe::Made(_) => "made",
            Recipe::Delegate(_) => "delegate",
            Recipe::Instance(_) => "instance",
            Recipe::OpenGeneric => "open-generic",
            Recipe::Decorator(_) => "decorator",
        }
    }
}

/// Producer descriptor: an immutable registration record.
pub struct Factory {
    pub(crate) id: FactoryId,
    pub(crate) service: ServiceType,
    pub(crate) service_key: Option<ServiceKey>,
    pub(crate) implementation: Option<ServiceType>,
    pub(crate) reuse: Reuse,
    pub(crate) setup: Setup,
    pub(crate) recipe: Recipe,
    pub(crate) disposable: Option<DisposeProbe>,
}

impl Factory {
    pub(crate) fn new(service: ServiceType, reuse: Reuse, setup: Setup, recipe: Recipe) -> Self {
        Self {
            id: FactoryId::next(),
            service,
            service_key: None,
            implementation: None,
            reuse,
            setup,
            recipe,
            disposable: None,
        }
    }

    /// Delegate factory for `T`, for use by unknown-service resolvers.
    pub fn delegate<T, F>(reuse: Reuse, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolverContext) -> DiResult<T> + Send + Sync + 'static,
    {
        let recipe = Recipe::Delegate(Arc::new(move |ctx| factory(ctx).map(|v| Arc::new(v) as AnyArc)));
        let mut factory = Self::new(ServiceType::of::<T>(), reuse, Setup::default(), recipe);
        factory.implementation = Some(ServiceType::of::<T>());
        factory
    }

    /// Constructor-recipe factory for `T`, for use by unknown-service resolvers.
    pub fn made<T: Send + Sync + 'static>(reuse: Reuse, made: Made<T>) -> Self {
        let (erased, disposable) = made.into_erased();
        let mut factory = Self::new(ServiceType::of::<T>(), reuse, Setup::default(), Recipe::Made(Arc::new(erased)));
        factory.implementation = Some(ServiceType::of::<T>());
        factory.disposable = disposable;
        factory
    }

    pub(crate) fn with_setup(mut self, setup: Setup) -> Self {
        self.setup = setup;
        self
    }

    /// Unique id; ids increase in registration order.
    pub fn id(&self) -> FactoryId {
        self.id
    }

    /// The service type this factory is registered for.
    pub fn service(&self) -> ServiceType {
        self.service
    }

    /// The service key, if registered keyed.
    pub fn service_key(&self) -> Option<&ServiceKey> {
        self.service_key.as_ref()
    }

    /// The implementation type, when known.
    pub fn implementation(&self) -> Option<ServiceType> {
        self.implementation
    }

    /// The reuse policy.
    pub fn reuse(&self) -> &Reuse {
        &self.reuse
    }

    /// The setup flags.
    pub fn setup(&self) -> &Setup {
        &self.setup
    }

    /// The factory kind.
    pub fn kind(&self) -> FactoryKind {
        self.setup.kind
    }

    /// Whether built instances are disposable.
    pub fn is_disposable(&self) -> bool {
        self.disposable.is_some()
    }

    /// Whether the recipe depends on non-reproducible runtime state.
    pub fn requires_runtime_state(&self) -> bool {
        matches!(self.recipe, Recipe::Delegate(_) | Recipe::Instance(_) | Recipe::Decorator(_))
            || self.service_key.as_ref().map_or(false, |k| !k.is_primitive())
            || self.setup.metadata.as_ref().map_or(false, |m| !m.is_primitive())
    }

    pub(crate) fn probe(&self, value: &AnyArc) -> Option<Arc<dyn Dispose>> {
        self.disposable.and_then(|probe| probe(value))
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("service_key", &self.service_key)
            .field("implementation", &self.implementation)
            .field("reuse", &self.reuse)
            .field("recipe", &self.recipe.label())
            .field("kind", &self.setup.kind)
            .finish()
    }
}
