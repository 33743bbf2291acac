//! Wrapper requests and open-generic families.
//!
//! A wrapper is a service the container builds around another one without
//! a registration of its own: [`Lazy<T>`] and [`Func<T>`] defer the inner
//! resolution, [`Many<T>`] collects every registration of `T` and
//! [`LazyMany<T>`] enumerates them on demand. Custom wrappers implement
//! [`Wrapper`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{DiError, DiResult};
use crate::provider::{engine, ResolverContext, ServiceInfo};
use crate::registration::{AnyArc, DisposeProbe, ErasedMade, Factory, IfUnresolved, Made};
use crate::traits::downcast;

/// A service shape built around an inner service.
///
/// `DEFERRED` wrappers resolve their inner service later, through a
/// resolution call, so they break dependency cycles and lifespan checks.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Container, DiResult, Registrator, Resolver, WrapSource, Wrapper};
/// use std::sync::Arc;
///
/// /// Resolves eagerly and remembers the type name.
/// #[derive(Clone)]
/// struct Named<T> { name: &'static str, value: Arc<T> }
///
/// impl<T: Clone + Send + Sync + 'static> Wrapper for Named<T> {
///     type Inner = T;
///     const DEFERRED: bool = false;
///
///     fn wrap(source: WrapSource<T>) -> DiResult<Self> {
///         Ok(Named { name: std::any::type_name::<T>(), value: source.resolve()? })
///     }
/// }
///
/// let container = Container::new();
/// container.register_instance(7u8).unwrap();
/// let named = container.get_wrapped::<Named<u8>>().unwrap();
/// assert_eq!((named.name, *named.value), ("u8", 7));
/// ```
pub trait Wrapper: Clone + Send + Sync + 'static {
    /// The wrapped service.
    type Inner: Send + Sync + 'static;

    /// Whether the inner service is resolved through a resolution call.
    const DEFERRED: bool;

    /// Request for the inner service.
    fn inner() -> ServiceInfo {
        ServiceInfo::of::<Self::Inner>()
    }

    /// Builds the wrapper.
    fn wrap(source: WrapSource<Self::Inner>) -> DiResult<Self>;
}

pub(crate) fn wrap_erased<W: Wrapper>(ctx: ResolverContext, info: ServiceInfo) -> DiResult<AnyArc> {
    W::wrap(WrapSource::new(ctx, info)).map(|wrapper| Arc::new(wrapper) as AnyArc)
}

/// Access to the inner service handed to [`Wrapper::wrap`].
///
/// The inner request carries the wrapper request's service key and required
/// implementation.
pub struct WrapSource<T> {
    ctx: ResolverContext,
    info: ServiceInfo,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> WrapSource<T> {
    fn new(ctx: ResolverContext, info: ServiceInfo) -> Self {
        Self {
            ctx,
            info,
            _marker: PhantomData,
        }
    }

    /// Resolves the inner service.
    pub fn resolve(&self) -> DiResult<Arc<T>> {
        let value = engine::resolve(&self.ctx, &self.info, IfUnresolved::Throw)?
            .ok_or_else(|| DiError::unknown_service(self.info.key()))?;
        downcast::<T>(value)
    }

    /// Resolves the inner service, `None` when nothing is registered.
    pub fn try_resolve(&self) -> DiResult<Option<Arc<T>>> {
        engine::resolve(&self.ctx, &self.info, IfUnresolved::ReturnDefault)?
            .map(downcast::<T>)
            .transpose()
    }

    /// Resolves every registration of the inner service.
    pub fn resolve_all(&self) -> DiResult<Vec<Arc<T>>> {
        engine::resolve_all(&self.ctx, &self.info)?
            .into_iter()
            .map(downcast::<T>)
            .collect()
    }

    /// Lazy enumeration of the inner service's registrations.
    pub fn into_lazy_many(self) -> LazyMany<T> {
        LazyMany::new(self.ctx.resolution_call(), self.info)
    }

    /// The context the wrapper is built in.
    pub fn context(&self) -> &ResolverContext {
        &self.ctx
    }

    /// The inner request.
    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }
}

/// Deferred single resolution; the first [`value`](Self::value) call
/// resolves and caches the inner service.
pub struct Lazy<T> {
    source: Arc<WrapSource<T>>,
    value: Arc<OnceCell<Arc<T>>>,
}

impl<T> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            value: self.value.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Lazy<T> {
    /// The inner service, resolved on first access.
    pub fn value(&self) -> DiResult<Arc<T>> {
        self.value.get_or_try_init(|| self.source.resolve()).cloned()
    }

    /// Whether the inner service has been resolved.
    pub fn is_created(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T: Send + Sync + 'static> Wrapper for Lazy<T> {
    type Inner = T;
    const DEFERRED: bool = true;

    fn wrap(source: WrapSource<T>) -> DiResult<Self> {
        Ok(Lazy {
            source: Arc::new(source),
            value: Arc::new(OnceCell::new()),
        })
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy").field("created", &self.value.get().is_some()).finish()
    }
}

/// Deferred factory: every [`call`](Self::call) resolves the inner service again.
pub struct Func<T> {
    source: Arc<WrapSource<T>>,
}

impl<T> Clone for Func<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Func<T> {
    /// Resolves the inner service.
    pub fn call(&self) -> DiResult<Arc<T>> {
        self.source.resolve()
    }
}

impl<T: Send + Sync + 'static> Wrapper for Func<T> {
    type Inner = T;
    const DEFERRED: bool = true;

    fn wrap(source: WrapSource<T>) -> DiResult<Self> {
        Ok(Func {
            source: Arc::new(source),
        })
    }
}

/// Every registration of `T`, in registration order.
///
/// Resolved eagerly by default; with the `resolve_enumerable_as_lazy` rule
/// the items are resolved while iterating.
pub struct Many<T> {
    items: ManyItems<T>,
}

enum ManyItems<T> {
    Eager(Arc<[Arc<T>]>),
    Lazy(LazyMany<T>),
}

impl<T> Clone for Many<T> {
    fn clone(&self) -> Self {
        let items = match &self.items {
            ManyItems::Eager(items) => ManyItems::Eager(items.clone()),
            ManyItems::Lazy(items) => ManyItems::Lazy(items.clone()),
        };
        Self { items }
    }
}

impl<T: Send + Sync + 'static> Many<T> {
    /// The items; lazy collections resolve each one on the way.
    pub fn iter(&self) -> Box<dyn Iterator<Item = DiResult<Arc<T>>> + '_> {
        match &self.items {
            ManyItems::Eager(items) => Box::new(items.iter().cloned().map(Ok)),
            ManyItems::Lazy(items) => Box::new(items.iter()),
        }
    }

    /// Collects the items, failing on the first unresolvable one.
    pub fn to_vec(&self) -> DiResult<Vec<Arc<T>>> {
        self.iter().collect()
    }

    /// Whether items are resolved while iterating.
    pub fn is_lazy(&self) -> bool {
        matches!(self.items, ManyItems::Lazy(_))
    }
}

impl<T: Send + Sync + 'static> Wrapper for Many<T> {
    type Inner = T;
    const DEFERRED: bool = false;

    fn wrap(source: WrapSource<T>) -> DiResult<Self> {
        let items = if source.context().container().rules().resolve_enumerable_as_lazy() {
            ManyItems::Lazy(source.into_lazy_many())
        } else {
            ManyItems::Eager(source.resolve_all()?.into())
        };
        Ok(Many { items })
    }
}

/// Lazy, restartable enumeration of every registration of `T`.
///
/// Each [`iter`](Self::iter) call reads the registrations current at that
/// moment.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Container, Made, Registrator, Resolver};
///
/// let container = Container::new();
/// container.register_made(Made::of(|| 1u8)).unwrap();
/// let all = container.resolve_many::<u8>();
/// assert_eq!(all.iter().count(), 1);
///
/// container.register_made(Made::of(|| 2u8)).unwrap();
/// let values: Vec<u8> = all.iter().map(|v| *v.unwrap()).collect();
/// assert_eq!(values, vec![1, 2]);
/// ```
pub struct LazyMany<T> {
    ctx: ResolverContext,
    info: ServiceInfo,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for LazyMany<T> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            info: self.info.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> LazyMany<T> {
    pub(crate) fn new(ctx: ResolverContext, info: ServiceInfo) -> Self {
        Self {
            ctx,
            info,
            _marker: PhantomData,
        }
    }

    /// Starts a new enumeration over the current registrations.
    pub fn iter(&self) -> LazyManyIter<T> {
        let (factories, error) = match engine::candidates(&self.ctx, &self.info) {
            Ok(factories) => (factories, None),
            Err(e) => (Vec::new(), Some(e)),
        };
        LazyManyIter {
            ctx: self.ctx.clone(),
            info: self.info.clone(),
            factories: factories.into_iter(),
            error,
            _marker: PhantomData,
        }
    }

    /// Collects the items, failing on the first unresolvable one.
    pub fn to_vec(&self) -> DiResult<Vec<Arc<T>>> {
        self.iter().collect()
    }
}

impl<'a, T: Send + Sync + 'static> IntoIterator for &'a LazyMany<T> {
    type Item = DiResult<Arc<T>>;
    type IntoIter = LazyManyIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator of [`LazyMany::iter`].
pub struct LazyManyIter<T> {
    ctx: ResolverContext,
    info: ServiceInfo,
    factories: std::vec::IntoIter<Arc<Factory>>,
    error: Option<DiError>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Iterator for LazyManyIter<T> {
    type Item = DiResult<Arc<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.error.take() {
            return Some(Err(e));
        }
        let factory = self.factories.next()?;
        Some(engine::resolve_factory(&self.ctx, &self.info, &factory).and_then(|instance| downcast::<T>(instance.into_value())))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.factories.len() + usize::from(self.error.is_some());
        (n, Some(n))
    }
}

/// Marker for an open-generic family type registered with
/// `Registrator::register_open_generic`.
pub trait GenericFamily: Send + Sync + 'static {}

/// Closes the family over the argument `A`.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Closes, Container, GenericFamily, Made, Registrator, Resolver, Reuse};
/// use std::marker::PhantomData;
///
/// struct Repository<E> { _entity: PhantomData<E> }
/// struct RepositoryFamily;
/// impl GenericFamily for RepositoryFamily {}
///
/// impl<E: Send + Sync + 'static> Closes<E> for RepositoryFamily {
///     type Closed = Repository<E>;
///     fn made() -> Made<Repository<E>> {
///         Made::of(|| Repository { _entity: PhantomData })
///     }
/// }
///
/// struct User;
/// struct Order;
///
/// let container = Container::new();
/// container.register_open_generic::<RepositoryFamily>(Reuse::Singleton).unwrap();
/// let users = container.get_generic::<RepositoryFamily, User>().unwrap();
/// let again = container.get_generic::<RepositoryFamily, User>().unwrap();
/// let orders = container.get_generic::<RepositoryFamily, Order>();
/// assert!(std::sync::Arc::ptr_eq(&users, &again));
/// assert!(orders.is_ok());
/// ```
pub trait Closes<A: ?Sized + 'static>: GenericFamily {
    /// The closed service type.
    type Closed: Send + Sync + 'static;

    /// Construction recipe of the closed type.
    fn made() -> Made<Self::Closed>;
}

pub(crate) fn close_erased<F, A>() -> (ErasedMade, Option<DisposeProbe>)
where
    F: Closes<A>,
    A: ?Sized + 'static,
{
    F::made().into_erased()
}
